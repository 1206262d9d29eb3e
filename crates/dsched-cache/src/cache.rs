//! Shared cache contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Linearizable key-value store with per-entry time-to-live.
///
/// `set_if_absent` must be atomic across every client of the store: it is the
/// single point where replicas race for ownership.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Store `value` under `key` only if no live entry exists.
    ///
    /// Returns `true` when this call created the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Read the live entry under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete the entry under `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}
