//! Redis key-value store.
//!
//! Used twice by the service: once as the read cache and once as the
//! idempotency claim store (optionally on a separate server).
//!
//! Claims use `SET key value NX EX ttl`, which checks and writes in one
//! round trip.
//!
//! # Example
//!
//! ```no_run
//! use hotel_listings::stores::RedisKeyValueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisKeyValueStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ListingError, Result};
use crate::providers::KeyValueStore;
use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// `Redis`-backed [`KeyValueStore`] over a multiplexed `ConnectionManager`.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn_manager: ConnectionManager,
}

impl RedisKeyValueStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| ListingError::Cache(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            ListingError::Cache(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager })
    }

    /// Whole seconds for `EX`, at least 1.
    #[allow(clippy::cast_sign_loss)] // Clamped to >= 1 first
    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.num_seconds().max(1) as u64
    }
}

impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        conn.get(key)
            .await
            .map_err(|e| ListingError::Cache(format!("Failed to read {key}: {e}")))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, Self::ttl_seconds(ttl))
            .await
            .map_err(|e| ListingError::Cache(format!("Failed to write {key}: {e}")))?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        // Nil reply when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| ListingError::Cache(format!("Failed to claim {key}: {e}")))?;

        Ok(reply.is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(keys)
            .await
            .map_err(|e| ListingError::Cache(format!("Failed to delete keys: {e}")))?;

        tracing::debug!(count = keys.len(), "Deleted keys from Redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_set_nx_ex_claims_once() {
        let store = RedisKeyValueStore::new(REDIS_URL).await.unwrap();
        let key = format!("idempotency:test:{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));

        assert!(store.set_nx_ex(&key, "processing".to_string(), Duration::seconds(5)).await.unwrap());
        assert!(!store.set_nx_ex(&key, "processing".to_string(), Duration::seconds(5)).await.unwrap());

        store.delete_many(&[key.clone()]).await.unwrap();
        assert!(store.set_nx_ex(&key, "processing".to_string(), Duration::seconds(5)).await.unwrap());
        store.delete_many(&[key]).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_values_expire() {
        let store = RedisKeyValueStore::new(REDIS_URL).await.unwrap();
        let key = "hotel:test:expiring";

        store.set_ex(key, "v".to_string(), Duration::seconds(1)).await.unwrap();
        assert_eq!(store.get(key).await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
        assert_eq!(store.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_delete_many() {
        let store = RedisKeyValueStore::new(REDIS_URL).await.unwrap();
        let keys = vec!["hotel:test:a".to_string(), "hotel:test:b".to_string()];
        for key in &keys {
            store.set_ex(key, "1".to_string(), Duration::minutes(1)).await.unwrap();
        }

        store.delete_many(&keys).await.unwrap();
        for key in &keys {
            assert!(store.get(key).await.unwrap().is_none());
        }
    }
}
