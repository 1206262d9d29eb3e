//! Per-job exclusivity token.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use dsched_cache::{CacheError, SharedCache};

use crate::keys::CacheKeys;

/// Acquires and releases the `lock-<key>` token in the shared cache.
///
/// The token value is the owning instance id and expires after the job's
/// lock TTL, which bounds how long a crashed holder blocks other replicas.
pub struct LockCoordinator {
    cache: Arc<dyn SharedCache>,
    keys: CacheKeys,
}

impl LockCoordinator {
    pub fn new(cache: Arc<dyn SharedCache>, keys: CacheKeys) -> Self {
        Self { cache, keys }
    }

    /// Try to become the holder of `schedule_key`.
    ///
    /// Returns `false` when another live token exists.
    pub async fn try_acquire(
        &self,
        schedule_key: &str,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let acquired = self
            .cache
            .set_if_absent(&self.keys.lock(schedule_key), owner_id, ttl)
            .await?;
        debug!(schedule_key, owner_id, acquired, "Lock acquisition attempt");
        Ok(acquired)
    }

    /// Delete the token of `schedule_key`.
    ///
    /// Ownership is not checked: a holder whose body outlived the TTL deletes
    /// whatever token is current, possibly one acquired by another replica.
    pub async fn release(&self, schedule_key: &str) -> Result<(), CacheError> {
        self.cache.remove(&self.keys.lock(schedule_key)).await
    }

    /// Instance currently holding the token, if any.
    pub async fn holder(&self, schedule_key: &str) -> Result<Option<String>, CacheError> {
        self.cache.get(&self.keys.lock(schedule_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsched_cache::MemoryCache;

    const TTL: Duration = Duration::from_secs(10);

    fn coordinator() -> LockCoordinator {
        LockCoordinator::new(Arc::new(MemoryCache::new()), CacheKeys::default())
    }

    #[tokio::test]
    async fn test_acquire_then_denied() {
        let locks = coordinator();
        assert!(locks.try_acquire("report", "a", TTL).await.unwrap());
        assert!(!locks.try_acquire("report", "b", TTL).await.unwrap());
        assert_eq!(locks.holder("report").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let locks = coordinator();
        assert!(locks.try_acquire("report", "a", TTL).await.unwrap());
        locks.release("report").await.unwrap();
        assert!(locks.holder("report").await.unwrap().is_none());
        assert!(locks.try_acquire("report", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_does_not_check_owner() {
        let locks = coordinator();
        assert!(locks.try_acquire("report", "a", TTL).await.unwrap());

        // "b" never held the lock but its release still removes "a"'s token.
        locks.release("report").await.unwrap();
        assert!(locks.holder("report").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let locks = coordinator();
        assert!(locks.try_acquire("one", "a", TTL).await.unwrap());
        assert!(locks.try_acquire("two", "a", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_can_be_taken() {
        let locks = coordinator();
        assert!(locks.try_acquire("report", "a", Duration::from_secs(1)).await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(locks.try_acquire("report", "b", TTL).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_single_winner() {
        let locks = Arc::new(coordinator());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let locks = locks.clone();
                tokio::spawn(async move {
                    locks
                        .try_acquire("race", &format!("node-{}", i), TTL)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
