//! Production storage implementations.
//!
//! - **Listing Store** (`PostgreSQL`) - listings, rooms, images, audit trail
//! - **Key-Value Store** (`Redis`) - read cache and idempotency claims

pub mod postgres;
pub mod redis_kv;

pub use postgres::{PostgresListingStore, PostgresListingTransaction};
pub use redis_kv::RedisKeyValueStore;

use crate::config::AppConfig;
use crate::error::Result;
use crate::service::ListingService;

/// Service wired to production stores.
pub type ProductionService = ListingService<PostgresListingStore, RedisKeyValueStore>;

/// Connect every store named in `config`, run migrations and build the
/// service.
///
/// The claim store gets its own connection even when it shares the cache
/// URL.
///
/// # Errors
///
/// Returns error if a connection or migration fails.
pub async fn connect(config: &AppConfig) -> Result<ProductionService> {
    let store = PostgresListingStore::connect(&config.postgres).await?;
    store.migrate().await?;

    let cache = RedisKeyValueStore::new(&config.redis.cache_url).await?;
    let claims = RedisKeyValueStore::new(&config.redis.idempotency_url).await?;

    tracing::info!(
        max_connections = config.postgres.max_connections,
        "Listing stores connected"
    );

    Ok(ListingService::new(store, cache, claims, config.listings.clone()))
}
