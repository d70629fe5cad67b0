//! Key-value store trait.
//!
//! Backs both the read cache and the idempotency claims. The two uses share
//! the trait (and may share a server) but never share keys.
//!
//! # Implementation
//!
//! **Production**: Redis (`SET key value NX EX ttl` for claims)
//! **Testing**: In-memory `HashMap` with expiry timestamps

use crate::error::Result;
use chrono::Duration;

/// String key-value store with TTLs and an atomic claim primitive.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Read a value. Expired keys read as `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a value with expiry, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a value with expiry only if the key is absent.
    ///
    /// This operation MUST be atomic (one round trip, no check-then-set):
    /// of N concurrent callers for the same key, exactly one observes `true`.
    ///
    /// # Returns
    ///
    /// `true` if the key was set, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn set_nx_ex(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete keys. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn delete_many(&self, keys: &[String]) -> impl std::future::Future<Output = Result<()>> + Send;
}
