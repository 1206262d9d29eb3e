//! Last execution record per schedule key.

use std::sync::Arc;
use std::time::Duration;

use dsched_cache::SharedCache;

use crate::error::GuardError;
use crate::keys::CacheKeys;
use crate::record::ExecutionRecord;

/// Reads and writes the `jobInfo-<key>` entry.
///
/// Records are JSON encoded. Callers pass twice the lock TTL so a record
/// outlives any lock window that produced it.
pub struct ExecutionHistoryStore {
    cache: Arc<dyn SharedCache>,
    keys: CacheKeys,
}

impl ExecutionHistoryStore {
    pub fn new(cache: Arc<dyn SharedCache>, keys: CacheKeys) -> Self {
        Self { cache, keys }
    }

    /// Last record of `schedule_key`, or `None` if never run or evicted.
    pub async fn read_last(&self, schedule_key: &str) -> Result<Option<ExecutionRecord>, GuardError> {
        match self.cache.get(&self.keys.history(schedule_key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the record of `schedule_key`.
    pub async fn write(
        &self,
        schedule_key: &str,
        record: &ExecutionRecord,
        ttl: Duration,
    ) -> Result<(), GuardError> {
        let raw = serde_json::to_string(record)?;
        self.cache
            .set(&self.keys.history(schedule_key), &raw, ttl)
            .await?;
        Ok(())
    }

    /// Remove the record of `schedule_key`.
    pub async fn clear(&self, schedule_key: &str) -> Result<(), GuardError> {
        self.cache.remove(&self.keys.history(schedule_key)).await?;
        Ok(())
    }
}
