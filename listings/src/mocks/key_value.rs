//! Mock key-value store for testing.

use crate::error::{ListingError, Result};
use crate::providers::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory key-value store honouring TTLs.
///
/// `set_nx_ex` checks and inserts under one lock, so it is atomic like the
/// Redis command it stands in for. [`set_unavailable`](Self::set_unavailable)
/// makes every call fail, simulating an outage.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Clone, Default)]
pub struct MockKeyValueStore {
    entries: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// `true` if `key` holds an unexpired value.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Utc::now())
    }

    /// Force `key` to expire now.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn expire(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ListingError::Cache("connection refused".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MockKeyValueStore {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Utc::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value, Utc::now() + ttl));
        Ok(())
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn set_nx_ex(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();

        if entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
        {
            return Ok(false);
        }

        entries.insert(key.to_string(), (value, now + ttl));
        Ok(true)
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
