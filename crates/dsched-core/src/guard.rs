//! Per-invocation workflow composing registry, lock, history and evaluator.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dsched_cache::SharedCache;
use dsched_config::{GuardConfig, JobConfig, PlaceholderResolver, MAX_LOCK_EXPIRY_SECONDS};

use crate::error::{GuardError, JobError};
use crate::evaluator::{ScheduleEvaluator, DEFAULT_TOLERANCE};
use crate::history::ExecutionHistoryStore;
use crate::keys::CacheKeys;
use crate::lock::LockCoordinator;
use crate::record::ExecutionRecord;
use crate::registry::{JobKeyRegistry, JobMethod};
use crate::schedule::{ScheduleError, ScheduleSpec};

/// Settings shared by every job guarded in this process.
#[derive(Debug, Clone)]
pub struct GuardSettings {
    /// Stable identifier of this replica, stored as lock value and in records.
    pub instance_id: String,
    /// Clock skew tolerated when checking due-ness.
    pub tolerance: Duration,
    /// Namespace of the cache keys.
    pub key_prefix: String,
}

impl GuardSettings {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            tolerance: DEFAULT_TOLERANCE,
            key_prefix: String::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Settings from the `[guard]` section. A random instance id is
    /// generated when none is configured.
    pub fn from_config(config: &GuardConfig) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(instance_id)
            .with_tolerance(Duration::from_millis(config.tolerance_ms))
            .with_key_prefix(config.key_prefix.clone())
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// A job declaration accepted by [`JobGuard::invoke_with_guard`].
#[derive(Debug, Clone)]
pub struct GuardedJob {
    key: String,
    method: JobMethod,
    lock_expiry: Duration,
    schedule: ScheduleSpec,
}

impl GuardedJob {
    /// Validate and build a job declaration.
    pub fn new(
        key: impl Into<String>,
        method: JobMethod,
        lock_expiry_seconds: u64,
        schedule: ScheduleSpec,
    ) -> Result<Self, GuardError> {
        let key = key.into();
        if key.is_empty() {
            return Err(GuardError::EmptyKey { method });
        }
        if lock_expiry_seconds == 0 || lock_expiry_seconds > MAX_LOCK_EXPIRY_SECONDS {
            return Err(GuardError::InvalidLockExpiry { key });
        }
        if schedule.is_empty() {
            return Err(GuardError::MissingScheduleDeclaration { key });
        }

        Ok(Self {
            key,
            method,
            lock_expiry: Duration::from_secs(lock_expiry_seconds),
            schedule,
        })
    }

    /// Build from a `[[jobs]]` entry, resolving its schedule placeholders.
    pub fn from_config(
        job: &JobConfig,
        method: JobMethod,
        resolver: &PlaceholderResolver,
    ) -> Result<Self, GuardError> {
        let schedule = ScheduleSpec::resolve(&job.schedule, resolver).map_err(|source| match source {
            ScheduleError::NoTrigger => GuardError::MissingScheduleDeclaration {
                key: job.key.clone(),
            },
            source => GuardError::InvalidSchedule {
                key: job.key.clone(),
                source,
            },
        })?;
        Self::new(job.key.clone(), method, job.lock_expiry_seconds, schedule)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn method(&self) -> &JobMethod {
        &self.method
    }

    pub fn schedule(&self) -> &ScheduleSpec {
        &self.schedule
    }

    pub fn lock_expiry(&self) -> Duration {
        self.lock_expiry
    }

    /// Execution records live twice as long as the lock.
    pub fn history_ttl(&self) -> Duration {
        self.lock_expiry.saturating_mul(2)
    }
}

/// Runs job bodies so that each tick executes on at most one replica.
///
/// Every replica builds its own `JobGuard` over the same shared cache. The
/// guard holds no state of its own besides the key registry; all
/// coordination goes through the cache.
pub struct JobGuard {
    registry: Arc<JobKeyRegistry>,
    locks: LockCoordinator,
    history: ExecutionHistoryStore,
    settings: GuardSettings,
}

impl JobGuard {
    /// Create a guard with its own, empty key registry.
    pub fn new(cache: Arc<dyn SharedCache>, settings: GuardSettings) -> Self {
        Self::with_registry(cache, Arc::new(JobKeyRegistry::new()), settings)
    }

    /// Create a guard sharing an existing key registry.
    pub fn with_registry(
        cache: Arc<dyn SharedCache>,
        registry: Arc<JobKeyRegistry>,
        settings: GuardSettings,
    ) -> Self {
        let keys = CacheKeys::new(settings.key_prefix.clone());
        Self {
            registry,
            locks: LockCoordinator::new(cache.clone(), keys.clone()),
            history: ExecutionHistoryStore::new(cache, keys),
            settings,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.settings.instance_id
    }

    pub fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobKeyRegistry {
        &self.registry
    }

    /// Bind the job's key to its method ahead of the first tick.
    pub fn register(&self, job: &GuardedJob) -> Result<(), GuardError> {
        self.registry.register(job.key(), job.method())
    }

    /// Run `body` if this replica wins the lock and the job is due.
    ///
    /// Returns `Ok(None)` when the tick is skipped (lock held elsewhere, or
    /// not due yet), `Ok(Some(value))` on success and `Err(GuardError::Job)`
    /// when the body failed. Both outcomes of a run are recorded in history
    /// and the lock is released afterwards.
    pub async fn invoke_with_guard<T, F, Fut>(
        &self,
        job: &GuardedJob,
        body: F,
    ) -> Result<Option<T>, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, JobError>>,
    {
        let key = job.key();
        let instance_id = self.instance_id();
        self.registry.register(key, job.method())?;

        debug!(schedule_key = key, method = %job.method(), "Guarded invocation started");

        if !self.locks.try_acquire(key, instance_id, job.lock_expiry()).await? {
            match self.history.read_last(key).await {
                Ok(last) => info!(
                    schedule_key = key,
                    last = ?last,
                    "Job is executing on another instance, skipping"
                ),
                Err(e) => info!(
                    schedule_key = key,
                    "Job is executing on another instance, skipping (last record unavailable: {})",
                    e
                ),
            }
            return Ok(None);
        }
        info!(schedule_key = key, instance_id, "Acquired job lock");

        let last = match self.history.read_last(key).await {
            Ok(last) => last,
            Err(e) => {
                self.release_lock(key).await;
                return Err(e);
            }
        };

        let due = ScheduleEvaluator::is_due(job.schedule(), last.as_ref(), Utc::now(), self.settings.tolerance);
        match due {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    schedule_key = key,
                    last = ?last,
                    "Next execution is not due yet, releasing lock"
                );
                self.release_lock(key).await;
                return Ok(None);
            }
            Err(source) => {
                self.release_lock(key).await;
                return Err(GuardError::InvalidSchedule {
                    key: key.to_string(),
                    source,
                });
            }
        }

        // Written before the body runs: a crash mid-body leaves a record
        // without end_time, which blocks further runs until it expires.
        let mut record = ExecutionRecord::started(instance_id, job.method(), Utc::now());
        if let Err(e) = self.history.write(key, &record, job.history_ttl()).await {
            self.release_lock(key).await;
            return Err(e);
        }
        info!(schedule_key = key, "Executing job");

        let outcome = match AssertUnwindSafe(body()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
        };

        record.finish(Utc::now(), &outcome);
        match &outcome {
            Ok(_) => info!(
                schedule_key = key,
                result_code = %record.result_code,
                "Job execution done"
            ),
            Err(e) => warn!(
                schedule_key = key,
                result_code = %record.result_code,
                "Job execution failed: {}",
                e
            ),
        }

        if let Err(e) = self.history.write(key, &record, job.history_ttl()).await {
            error!(
                schedule_key = key,
                "Failed to write final execution record: {}", e
            );
        }
        self.release_lock(key).await;

        outcome.map(Some).map_err(GuardError::Job)
    }

    /// Last execution record of `schedule_key`.
    pub async fn last_execution(&self, schedule_key: &str) -> Result<Option<ExecutionRecord>, GuardError> {
        self.history.read_last(schedule_key).await
    }

    /// Instance currently holding the lock of `schedule_key`.
    pub async fn lock_holder(&self, schedule_key: &str) -> Result<Option<String>, GuardError> {
        Ok(self.locks.holder(schedule_key).await?)
    }

    /// Remove the execution record of `schedule_key`.
    ///
    /// This is the operator's way out of a record left `running` by a crashed
    /// replica; otherwise the job stays blocked until the record expires.
    pub async fn clear_history(&self, schedule_key: &str) -> Result<(), GuardError> {
        self.history.clear(schedule_key).await?;
        warn!(schedule_key, "Execution record cleared");
        Ok(())
    }

    /// Release the lock, logging instead of failing: the TTL frees it anyway.
    async fn release_lock(&self, schedule_key: &str) {
        match self.locks.release(schedule_key).await {
            Ok(()) => debug!(schedule_key, "Released job lock"),
            Err(e) => error!(
                schedule_key,
                "Failed to release job lock, it will expire by TTL: {}", e
            ),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
