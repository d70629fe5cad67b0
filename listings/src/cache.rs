//! Cache gateway and invalidation fan-out.
//!
//! Every read view of a listing lives under a [`CacheKey`]. Mutations never
//! scan for keys: [`keys_for`] returns the complete, static list of keys a
//! given mutation can make stale, so invalidation costs one `DEL` of a
//! handful of keys regardless of cache size.
//!
//! The cache is advisory. Read failures degrade to a miss and write or
//! invalidation failures are logged; entries that survive a failed
//! invalidation expire with their TTL.

use crate::constants::key_prefixes;
use crate::error::Result;
use crate::providers::KeyValueStore;
use crate::state::{ListingId, UserId};
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;

/// Audience a listing detail is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailScope {
    /// The owning merchant.
    Owner,
    /// A moderator.
    Admin,
    /// Anonymous guests.
    Public,
}

impl DetailScope {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Public => "public",
        }
    }
}

/// A cacheable view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Listing detail for one audience.
    ListingDetail {
        /// Audience
        scope: DetailScope,
        /// Listing
        listing_id: ListingId,
    },
    /// Public room list of a listing.
    PublicRooms(ListingId),
    /// Default (unfiltered, first page) list of a merchant's listings.
    MerchantList(UserId),
    /// Region/status aggregates of a merchant's listings.
    MerchantStats(UserId),
    /// Default (unfiltered, first page) global admin list.
    AdminList,
    /// Global region/status aggregates.
    AdminStats,
    /// Homepage featured banners.
    HomeBanners,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = key_prefixes::CACHE;
        match self {
            Self::ListingDetail { scope, listing_id } => {
                write!(f, "{prefix}:detail:{}:{listing_id}", scope.as_str())
            }
            Self::PublicRooms(listing_id) => write!(f, "{prefix}:rooms:public:{listing_id}"),
            Self::MerchantList(owner) => write!(f, "{prefix}:list:merchant:{owner}"),
            Self::MerchantStats(owner) => write!(f, "{prefix}:stats:merchant:{owner}"),
            Self::AdminList => write!(f, "{prefix}:list:admin"),
            Self::AdminStats => write!(f, "{prefix}:stats:admin"),
            Self::HomeBanners => write!(f, "{prefix}:banners"),
        }
    }
}

/// Kind of committed mutation, used to pick the invalidation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Listing content save (create or update).
    Save,
    /// Stock-only update.
    StockUpdate,
    /// Moderation audit (approve/reject).
    Audit,
    /// Online/offline toggle.
    Toggle,
}

/// Every cache key that may hold a stale view after `mutation` on
/// `listing_id` (owned by `owner_id`) commits.
///
/// Stock updates leave status and region untouched, so they skip the
/// aggregates and banners; every other mutation can move a listing between
/// statuses and therefore in or out of the featured set.
#[must_use]
pub fn keys_for(mutation: Mutation, listing_id: ListingId, owner_id: UserId) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::ListingDetail {
            scope: DetailScope::Owner,
            listing_id,
        },
        CacheKey::ListingDetail {
            scope: DetailScope::Admin,
            listing_id,
        },
        CacheKey::ListingDetail {
            scope: DetailScope::Public,
            listing_id,
        },
        CacheKey::PublicRooms(listing_id),
        CacheKey::MerchantList(owner_id),
        CacheKey::AdminList,
    ];

    match mutation {
        Mutation::StockUpdate => {}
        Mutation::Save | Mutation::Audit | Mutation::Toggle => {
            keys.extend([
                CacheKey::MerchantStats(owner_id),
                CacheKey::AdminStats,
                CacheKey::HomeBanners,
            ]);
        }
    }

    keys
}

/// Typed cache-aside wrapper over a [`KeyValueStore`].
///
/// Values are stored as JSON.
#[derive(Clone)]
pub struct CacheGateway<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> CacheGateway<K> {
    /// Create a gateway over `store`.
    #[must_use]
    pub const fn new(store: K) -> Self {
        Self { store }
    }

    /// Access the backing store.
    #[must_use]
    pub const fn store(&self) -> &K {
        &self.store
    }

    /// Read a cached value.
    ///
    /// An entry that no longer deserializes into `T` reads as a miss.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(raw) = self.store.get(&key.to_string()).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Write a value with a TTL.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the store is unreachable.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set_ex(&key.to_string(), json, ttl).await
    }

    /// Remove all `keys` in one call.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn invalidate_all(&self, keys: &[CacheKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.store.delete_many(&keys).await?;
        tracing::debug!(count = keys.len(), "Invalidated cache keys");
        Ok(())
    }

    /// Return the cached value for `key`, or run `load`, cache its result
    /// and return it.
    ///
    /// Cache failures never fail the read: an unreachable store is treated
    /// as a miss and a failed write is only logged.
    ///
    /// # Errors
    ///
    /// Returns whatever error `load` returns.
    pub async fn get_or_load<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.get(key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to storage");
            }
        }

        let value = load().await?;

        if let Err(e) = self.set(key, &value, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }

        Ok(value)
    }
}
