//! Listing pipeline constants.

/// Key namespaces in the key-value stores.
pub mod key_prefixes {
    /// Read-cache entries.
    pub const CACHE: &str = "hotel";

    /// Idempotency claims. Kept disjoint from [`CACHE`] so that cache
    /// invalidation can never release a claim.
    pub const IDEMPOTENCY: &str = "idempotency";
}

/// Value stored under an idempotency claim while the request is in flight.
pub const PROCESSING_SENTINEL: &str = "processing";

/// Mean Earth radius used by the haversine distance, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Largest room stock the `INTEGER` column holds.
pub const MAX_STOCK: u32 = i32::MAX.unsigned_abs();

/// Decimal places kept by the `NUMERIC(12,2)` price column.
pub const PRICE_SCALE: u32 = 2;

/// Integer digits allowed by the `NUMERIC(12,2)` price column.
pub const PRICE_INTEGER_DIGITS: u32 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixes_are_disjoint() {
        assert_ne!(key_prefixes::CACHE, key_prefixes::IDEMPOTENCY);
        assert!(!key_prefixes::CACHE.starts_with(key_prefixes::IDEMPOTENCY));
        assert!(!key_prefixes::IDEMPOTENCY.starts_with(key_prefixes::CACHE));
    }
}
