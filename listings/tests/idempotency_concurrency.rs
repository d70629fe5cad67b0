//! At-most-once admission of write requests.

#![allow(clippy::unwrap_used)]

mod common;

use common::{harness, hotel, room};
use futures::future::join_all;
use hotel_listings::idempotency::{IdempotencyGuard, PayloadFingerprint};
use hotel_listings::mocks::MockKeyValueStore;
use hotel_listings::{ListingError, Principal};

#[tokio::test]
async fn test_concurrent_duplicates_admit_exactly_one() {
    let h = harness();
    let merchant = Principal::merchant(7);
    let payload = hotel("Riverside", vec![room("Queen", 380, 5)]);

    let results = join_all(
        (0..4).map(|_| h.service.save_listing(&merchant, "double-click", &payload)),
    )
    .await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        let err = result.as_ref().unwrap_err();
        assert_eq!(*err, ListingError::DuplicateSubmission);
        assert!(err.is_retryable());
    }
    assert_eq!(h.service.store().all_listings().await.len(), 1);
}

#[tokio::test]
async fn test_claim_scoped_by_principal_and_payload() {
    let h = harness();
    let payload = hotel("Riverside", vec![]);

    h.service
        .save_listing(&Principal::merchant(7), "req-1", &payload)
        .await
        .unwrap();
    // Same request id from another merchant.
    h.service
        .save_listing(&Principal::merchant(8), "req-1", &payload)
        .await
        .unwrap();
    // Same merchant and request id, different content.
    h.service
        .save_listing(&Principal::merchant(7), "req-1", &hotel("Hillside", vec![]))
        .await
        .unwrap();

    assert_eq!(h.service.store().all_listings().await.len(), 3);
}

#[tokio::test]
async fn test_successful_claim_expires_with_ttl() {
    let h = harness();
    let merchant = Principal::merchant(7);
    let payload = hotel("Riverside", vec![]);

    h.service.save_listing(&merchant, "req-1", &payload).await.unwrap();
    let err = h
        .service
        .save_listing(&merchant, "req-1", &payload)
        .await
        .unwrap_err();
    assert_eq!(err, ListingError::DuplicateSubmission);

    let key = IdempotencyGuard::<MockKeyValueStore>::claim_key(
        &merchant,
        "req-1",
        &PayloadFingerprint::for_listing(&payload),
    );
    assert!(h.claims.contains(&key));
    h.claims.expire(&key);

    h.service.save_listing(&merchant, "req-1", &payload).await.unwrap();
    assert_eq!(h.service.store().all_listings().await.len(), 2);
}

#[tokio::test]
async fn test_claim_store_outage_rejects_writes() {
    let h = harness();
    h.claims.set_unavailable(true);

    let err = h
        .service
        .save_listing(&Principal::merchant(7), "req-1", &hotel("Riverside", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, ListingError::Cache(_)));
    assert!(!err.is_retryable());
    assert!(h.service.store().all_listings().await.is_empty());
}

#[tokio::test]
async fn test_blank_request_id_is_rejected() {
    let h = harness();

    let err = h
        .service
        .save_listing(&Principal::merchant(7), "  ", &hotel("Riverside", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, ListingError::Validation { .. }));
}
