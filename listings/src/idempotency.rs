//! Idempotency guard for mutating requests.
//!
//! A request is admitted by atomically claiming the key
//! `idempotency:{principal}:{request_id}:{fingerprint}` with
//! `SET NX EX`. A second request with the same key inside the TTL window is
//! rejected as a duplicate; after expiry it is treated as new.
//!
//! # Fingerprints
//!
//! The fingerprint hashes the business-identifying fields of a payload
//! (for listings: name, address and region), not the whole payload. Two
//! different listings submitted under one request id therefore do not
//! collide, while a retried submission of the same listing does.
//!
//! # Failure mode
//!
//! The guard fails closed: if the claim store is unreachable the request is
//! refused with an infrastructure error rather than processed unguarded.

use crate::constants::{key_prefixes, PROCESSING_SENTINEL};
use crate::error::{ListingError, Result};
use crate::providers::KeyValueStore;
use crate::state::{ListingId, ListingPayload, ListingStatus, Principal, StockUpdate};
use chrono::Duration;
use sha2::{Digest, Sha256};
use std::fmt;

/// ASCII unit separator placed between hashed fields.
const FIELD_SEPARATOR: &str = "\u{1f}";

/// SHA-256 over a payload's identifying fields, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadFingerprint(String);

impl PayloadFingerprint {
    /// Fingerprint arbitrary fields, in order.
    #[must_use]
    pub fn of_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(FIELD_SEPARATOR.as_bytes());
            }
            hasher.update(field.as_ref().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint of a listing save: name, address and region, trimmed and
    /// case-folded.
    #[must_use]
    pub fn for_listing(payload: &ListingPayload) -> Self {
        let normalize = |s: &str| s.trim().to_lowercase();
        Self::of_fields(&[
            "listing".to_string(),
            normalize(&payload.name),
            normalize(&payload.address),
            normalize(&payload.region),
        ])
    }

    /// Fingerprint of a stock update: listing plus the sorted room/stock pairs.
    #[must_use]
    pub fn for_stock_update(listing_id: ListingId, updates: &[StockUpdate]) -> Self {
        let mut pairs: Vec<(i64, u32)> = updates
            .iter()
            .map(|u| (u.room_id.0, u.new_stock))
            .collect();
        pairs.sort_unstable();

        let mut fields = vec!["stock".to_string(), listing_id.to_string()];
        fields.extend(pairs.into_iter().map(|(room, stock)| format!("{room}={stock}")));
        Self::of_fields(&fields)
    }

    /// Fingerprint of a moderation command: listing plus target status.
    #[must_use]
    pub fn for_moderation(listing_id: ListingId, target: ListingStatus) -> Self {
        Self::of_fields(&["moderation", listing_id.to_string().as_str(), target.as_str()])
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held idempotency claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    key: String,
}

impl Claim {
    /// Store key of this claim.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First request for this key inside the window.
    Admitted(Claim),
    /// A request with the same key is in flight or was recently processed.
    Duplicate,
}

/// Claim-or-reject gate in front of mutating operations.
#[derive(Clone)]
pub struct IdempotencyGuard<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> IdempotencyGuard<K> {
    /// Create a guard over `store`.
    #[must_use]
    pub const fn new(store: K) -> Self {
        Self { store }
    }

    /// Store key for a principal, client request id and fingerprint.
    #[must_use]
    pub fn claim_key(
        principal: &Principal,
        client_request_id: &str,
        fingerprint: &PayloadFingerprint,
    ) -> String {
        format!(
            "{}:{}:{}:{}",
            key_prefixes::IDEMPOTENCY,
            principal.id,
            client_request_id,
            fingerprint
        )
    }

    /// Atomically claim the request key for `ttl`.
    ///
    /// # Errors
    ///
    /// - [`ListingError::Validation`] if `client_request_id` is blank
    /// - [`ListingError::Cache`] if the claim store is unreachable (fail closed)
    pub async fn admit(
        &self,
        principal: &Principal,
        client_request_id: &str,
        fingerprint: &PayloadFingerprint,
        ttl: Duration,
    ) -> Result<Admission> {
        if client_request_id.trim().is_empty() {
            return Err(ListingError::validation(
                "request_id",
                "client request id is required",
            ));
        }

        let key = Self::claim_key(principal, client_request_id, fingerprint);

        let claimed = self
            .store
            .set_nx_ex(&key, PROCESSING_SENTINEL.to_string(), ttl)
            .await
            .map_err(|e| {
                tracing::error!(
                    principal_id = %principal.id,
                    error = %e,
                    "Idempotency store unavailable, refusing request"
                );
                e
            })?;

        if claimed {
            Ok(Admission::Admitted(Claim { key }))
        } else {
            tracing::info!(
                principal_id = %principal.id,
                request_id = %client_request_id,
                "Rejected duplicate submission"
            );
            Ok(Admission::Duplicate)
        }
    }

    /// Like [`admit`](Self::admit) but turns a duplicate into
    /// [`ListingError::DuplicateSubmission`].
    ///
    /// # Errors
    ///
    /// Same as [`admit`](Self::admit), plus `DuplicateSubmission`.
    pub async fn claim(
        &self,
        principal: &Principal,
        client_request_id: &str,
        fingerprint: &PayloadFingerprint,
        ttl: Duration,
    ) -> Result<Claim> {
        match self.admit(principal, client_request_id, fingerprint, ttl).await? {
            Admission::Admitted(claim) => Ok(claim),
            Admission::Duplicate => Err(ListingError::DuplicateSubmission),
        }
    }

    /// Release a claim after the guarded operation failed, so a corrected
    /// resubmission is not mistaken for a duplicate. Best-effort.
    pub async fn release(&self, claim: Claim) {
        if let Err(e) = self.store.delete_many(&[claim.key]).await {
            tracing::warn!(error = %e, "Failed to release idempotency claim, it will expire");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockKeyValueStore;
    use crate::state::RoomId;
    use std::sync::Arc;

    fn payload(name: &str, address: &str) -> ListingPayload {
        ListingPayload {
            id: None,
            name: name.to_string(),
            hotel_type: "business".to_string(),
            region: "Shanghai".to_string(),
            address: address.to_string(),
            latitude: 31.23,
            longitude: 121.47,
            star_rating: 4,
            facilities: vec![],
            description: None,
            is_featured: false,
            rooms: vec![],
            images: vec![],
        }
    }

    #[test]
    fn test_fingerprint_ignores_non_identifying_fields() {
        let a = payload("Harbour View", "1 Bund Rd");
        let mut b = a.clone();
        b.star_rating = 5;
        b.description = Some("renovated".to_string());

        assert_eq!(
            PayloadFingerprint::for_listing(&a),
            PayloadFingerprint::for_listing(&b)
        );
    }

    #[test]
    fn test_fingerprint_normalizes_whitespace_and_case() {
        let a = payload("Harbour View", "1 Bund Rd");
        let b = payload("  harbour view ", "1 BUND RD");
        assert_eq!(
            PayloadFingerprint::for_listing(&a),
            PayloadFingerprint::for_listing(&b)
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_listings() {
        let a = payload("Harbour View", "1 Bund Rd");
        let b = payload("Harbour View", "2 Bund Rd");
        assert_ne!(
            PayloadFingerprint::for_listing(&a),
            PayloadFingerprint::for_listing(&b)
        );
    }

    #[test]
    fn test_stock_fingerprint_is_order_independent() {
        let a = [
            StockUpdate { room_id: RoomId(1), new_stock: 3 },
            StockUpdate { room_id: RoomId(2), new_stock: 5 },
        ];
        let b = [a[1], a[0]];
        assert_eq!(
            PayloadFingerprint::for_stock_update(ListingId(1), &a),
            PayloadFingerprint::for_stock_update(ListingId(1), &b)
        );
    }

    #[tokio::test]
    async fn test_second_admission_is_duplicate() {
        let guard = IdempotencyGuard::new(MockKeyValueStore::new());
        let principal = Principal::merchant(1);
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));
        let ttl = Duration::seconds(120);

        let first = guard.admit(&principal, "req-1", &fp, ttl).await.unwrap();
        let second = guard.admit(&principal, "req-1", &fp, ttl).await.unwrap();

        assert!(matches!(first, Admission::Admitted(_)));
        assert_eq!(second, Admission::Duplicate);
    }

    #[tokio::test]
    async fn test_claims_are_scoped_per_principal() {
        let guard = IdempotencyGuard::new(MockKeyValueStore::new());
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));
        let ttl = Duration::seconds(120);

        let a = guard.admit(&Principal::merchant(1), "req", &fp, ttl).await.unwrap();
        let b = guard.admit(&Principal::merchant(2), "req", &fp, ttl).await.unwrap();

        assert!(matches!(a, Admission::Admitted(_)));
        assert!(matches!(b, Admission::Admitted(_)));
    }

    #[tokio::test]
    async fn test_expired_claim_admits_again() {
        let store = MockKeyValueStore::new();
        let guard = IdempotencyGuard::new(store.clone());
        let principal = Principal::merchant(1);
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));
        let ttl = Duration::seconds(120);

        let Admission::Admitted(claim) = guard.admit(&principal, "req", &fp, ttl).await.unwrap()
        else {
            panic!("first admission must succeed");
        };
        store.expire(claim.key());

        let again = guard.admit(&principal, "req", &fp, ttl).await.unwrap();
        assert!(matches!(again, Admission::Admitted(_)));
    }

    #[tokio::test]
    async fn test_released_claim_admits_again() {
        let guard = IdempotencyGuard::new(MockKeyValueStore::new());
        let principal = Principal::merchant(1);
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));
        let ttl = Duration::seconds(120);

        let claim = guard.claim(&principal, "req", &fp, ttl).await.unwrap();
        guard.release(claim).await;

        assert!(guard.claim(&principal, "req", &fp, ttl).await.is_ok());
    }

    #[tokio::test]
    async fn test_fails_closed_when_store_unavailable() {
        let store = MockKeyValueStore::new();
        store.set_unavailable(true);
        let guard = IdempotencyGuard::new(store);
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));

        let result = guard
            .admit(&Principal::merchant(1), "req", &fp, Duration::seconds(120))
            .await;

        assert!(matches!(result, Err(ListingError::Cache(_))));
    }

    #[tokio::test]
    async fn test_blank_request_id_is_rejected() {
        let guard = IdempotencyGuard::new(MockKeyValueStore::new());
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));

        let result = guard
            .admit(&Principal::merchant(1), "  ", &fp, Duration::seconds(120))
            .await;

        assert!(matches!(result, Err(ListingError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_admissions_admit_exactly_one() {
        let guard = Arc::new(IdempotencyGuard::new(MockKeyValueStore::new()));
        let fp = PayloadFingerprint::for_listing(&payload("A", "B"));

        let mut handles = vec![];
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            let fp = fp.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .admit(&Principal::merchant(1), "req", &fp, Duration::seconds(120))
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Admission::Admitted(_)) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
