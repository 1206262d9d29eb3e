//! In-process TTL cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::cache::SharedCache;
use crate::error::CacheError;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`SharedCache`].
///
/// Every operation runs under one mutex, which makes `set_if_absent` atomic
/// for all tasks of the process. Expired entries are dropped lazily on access.
/// Uses tokio's clock so paused-time tests can drive expiry.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Check if the cache holds no live entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Expiry instant of an entry written at `now`.
    fn expiry(key: &str, now: Instant, ttl: Duration) -> Result<Instant, CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl(key.to_string()));
        }
        now.checked_add(ttl)
            .ok_or_else(|| CacheError::InvalidTtl(key.to_string()))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let expires_at = Self::expiry(key, now, ttl)?;
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            trace!(key, "set_if_absent: live entry present");
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Self::expiry(key, Instant::now(), ttl)?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
