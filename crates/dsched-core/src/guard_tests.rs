use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dsched_cache::{CacheError, MemoryCache};
use mockall::mock;
use tokio::sync::oneshot;

use crate::record::{RESULT_SUCCESS, RESULT_UNKNOWN_ERROR};

fn method() -> JobMethod {
    JobMethod::new("ReportJobs", "nightly")
}

fn hourly_job(key: &str) -> GuardedJob {
    GuardedJob::new(
        key,
        method(),
        30,
        ScheduleSpec::default().with_fixed_rate(Duration::from_secs(3600)),
    )
    .unwrap()
}

fn guard_over(cache: Arc<MemoryCache>, instance: &str) -> JobGuard {
    JobGuard::new(cache, GuardSettings::new(instance))
}

fn explode() -> Result<u32, JobError> {
    panic!("kaboom")
}

mock! {
    pub Cache {}

    #[async_trait]
    impl SharedCache for Cache {
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
        async fn remove(&self, key: &str) -> Result<(), CacheError>;
    }
}

#[test]
fn test_guarded_job_validation() {
    let spec = ScheduleSpec::default().with_fixed_delay(Duration::from_millis(100));

    let err = GuardedJob::new("", method(), 30, spec.clone()).unwrap_err();
    assert!(matches!(err, GuardError::EmptyKey { .. }));

    let err = GuardedJob::new("job", method(), 0, spec.clone()).unwrap_err();
    assert!(matches!(err, GuardError::InvalidLockExpiry { .. }));

    let err = GuardedJob::new("job", method(), 30, ScheduleSpec::default()).unwrap_err();
    assert!(matches!(err, GuardError::MissingScheduleDeclaration { .. }));

    let job = GuardedJob::new("job", method(), 30, spec).unwrap();
    assert_eq!(job.lock_expiry(), Duration::from_secs(30));
    assert_eq!(job.history_ttl(), Duration::from_secs(60));
}

#[test]
fn test_lock_expiry_upper_bound() {
    let spec = ScheduleSpec::default().with_fixed_delay(Duration::from_millis(100));

    let err = GuardedJob::new("job", method(), u64::MAX, spec.clone()).unwrap_err();
    assert!(matches!(err, GuardError::InvalidLockExpiry { .. }));
    assert!(err.is_configuration());

    let err = GuardedJob::new("job", method(), MAX_LOCK_EXPIRY_SECONDS + 1, spec.clone()).unwrap_err();
    assert!(matches!(err, GuardError::InvalidLockExpiry { .. }));

    let job = GuardedJob::new("job", method(), MAX_LOCK_EXPIRY_SECONDS, spec).unwrap();
    assert_eq!(job.history_ttl(), Duration::from_secs(2 * MAX_LOCK_EXPIRY_SECONDS));
}

#[tokio::test]
async fn test_longest_lock_expiry_runs_over_memory_cache() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "node-1");
    let job = GuardedJob::new(
        "yearly",
        method(),
        MAX_LOCK_EXPIRY_SECONDS,
        ScheduleSpec::default().with_fixed_delay(Duration::from_secs(1)),
    )
    .unwrap();

    let value = guard.invoke_with_guard(&job, || async { Ok(7) }).await.unwrap();
    assert_eq!(value, Some(7));
    assert!(guard.lock_holder("yearly").await.unwrap().is_none());
}

#[test]
fn test_guarded_job_from_config() {
    let job_config: JobConfig = toml::from_str(
        r#"
        key = "report"
        lock_expiry_seconds = 10
        fixed_delay_expression = "${report.delay:250}"
        "#,
    )
    .unwrap();
    let resolver = PlaceholderResolver::default().without_env();

    let job = GuardedJob::from_config(&job_config, method(), &resolver).unwrap();
    assert_eq!(job.schedule().fixed_delay, Some(Duration::from_millis(250)));

    let empty: JobConfig = toml::from_str(
        r#"
        key = "empty"
        lock_expiry_seconds = 10
        "#,
    )
    .unwrap();
    let err = GuardedJob::from_config(&empty, method(), &resolver).unwrap_err();
    assert!(matches!(err, GuardError::MissingScheduleDeclaration { ref key } if key == "empty"));

    let bad: JobConfig = toml::from_str(
        r#"
        key = "bad"
        lock_expiry_seconds = 10
        cron = "every day"
        "#,
    )
    .unwrap();
    let err = GuardedJob::from_config(&bad, method(), &resolver).unwrap_err();
    assert!(matches!(err, GuardError::InvalidSchedule { .. }));
    assert!(err.is_configuration());
}

#[test]
fn test_settings_from_config() {
    let config = GuardConfig {
        instance_id: Some("replica-a".to_string()),
        tolerance_ms: 25,
        key_prefix: "svc:".to_string(),
    };
    let settings = GuardSettings::from_config(&config);
    assert_eq!(settings.instance_id, "replica-a");
    assert_eq!(settings.tolerance, Duration::from_millis(25));
    assert_eq!(settings.key_prefix, "svc:");

    let generated = GuardSettings::from_config(&GuardConfig::default());
    assert!(Uuid::parse_str(&generated.instance_id).is_ok());
}

#[tokio::test]
async fn test_first_run_executes_then_not_due() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "replica-a");
    let job = hourly_job("report");
    let calls = AtomicUsize::new(0);

    let first = guard
        .invoke_with_guard(&job, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, JobError>(7)
        })
        .await
        .unwrap();
    assert_eq!(first, Some(7));

    let record = guard.last_execution("report").await.unwrap().unwrap();
    assert_eq!(record.instance_id, "replica-a");
    assert_eq!(record.job_type, "ReportJobs");
    assert_eq!(record.job_method, "nightly");
    assert_eq!(record.result_code, RESULT_SUCCESS);
    assert!(!record.running);
    assert!(record.is_complete());
    assert!(guard.lock_holder("report").await.unwrap().is_none());

    let second = guard
        .invoke_with_guard(&job, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, JobError>(8)
        })
        .await
        .unwrap();
    assert_eq!(second, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(guard.lock_holder("report").await.unwrap().is_none());
}

#[tokio::test]
async fn test_domain_failure_is_recorded() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "replica-a");
    let job = hourly_job("report");

    let err = guard
        .invoke_with_guard(&job, || async { Err::<(), _>(JobError::domain("E1", "boom")) })
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Job(JobError::Domain { ref code, .. }) if code == "E1"));
    assert!(!err.is_configuration());

    let record = guard.last_execution("report").await.unwrap().unwrap();
    assert_eq!(record.result_code, "E1");
    assert_eq!(record.message, "boom");
    assert!(!record.running);
    assert!(record.end_time.is_some());

    // The lock is free again
    let holder = guard.lock_holder("report").await.unwrap();
    assert!(holder.is_none());
}

#[tokio::test]
async fn test_unclassified_failure_records_unknown_error() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "replica-a");
    let job = hourly_job("report");

    let result = guard
        .invoke_with_guard(&job, || async {
            Err::<(), _>(JobError::from(std::io::Error::other("disk full")))
        })
        .await;
    assert!(matches!(result, Err(GuardError::Job(JobError::Unclassified(_)))));

    let record = guard.last_execution("report").await.unwrap().unwrap();
    assert_eq!(record.result_code, RESULT_UNKNOWN_ERROR);
    assert_eq!(record.message, "disk full");
}

#[tokio::test]
async fn test_panic_is_recorded_and_lock_released() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "replica-a");
    let job = hourly_job("report");

    let result = guard.invoke_with_guard(&job, || async { explode() }).await;
    assert!(matches!(result, Err(GuardError::Job(JobError::Panicked(ref msg))) if msg == "kaboom"));

    let record = guard.last_execution("report").await.unwrap().unwrap();
    assert_eq!(record.result_code, RESULT_UNKNOWN_ERROR);
    assert_eq!(record.message, "kaboom");
    assert!(guard.lock_holder("report").await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_replica_skips_while_lock_held() {
    let cache = Arc::new(MemoryCache::new());
    let guard_a = Arc::new(guard_over(cache.clone(), "replica-a"));
    let guard_b = guard_over(cache, "replica-b");
    let job = hourly_job("report");

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (finish_tx, finish_rx) = oneshot::channel::<()>();

    let handle = {
        let guard_a = guard_a.clone();
        let job = job.clone();
        tokio::spawn(async move {
            guard_a
                .invoke_with_guard(&job, move || async move {
                    let _ = started_tx.send(());
                    let _ = finish_rx.await;
                    Ok::<_, JobError>("a")
                })
                .await
        })
    };

    started_rx.await.unwrap();
    assert_eq!(
        guard_b.lock_holder("report").await.unwrap().as_deref(),
        Some("replica-a")
    );

    let b_calls = AtomicUsize::new(0);
    let skipped = guard_b
        .invoke_with_guard(&job, || async {
            b_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, JobError>("b")
        })
        .await
        .unwrap();
    assert_eq!(skipped, None);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);

    // B must not have touched A's lock or running record
    let running = guard_b.last_execution("report").await.unwrap().unwrap();
    assert!(running.running);
    assert_eq!(running.instance_id, "replica-a");

    finish_tx.send(()).unwrap();
    let a_result = handle.await.unwrap().unwrap();
    assert_eq!(a_result, Some("a"));
    assert!(guard_b.lock_holder("report").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stuck_record_blocks_until_cleared() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache.clone(), "replica-a");
    let job = hourly_job("report");

    // Leftover of a replica that crashed mid-body
    let history = ExecutionHistoryStore::new(cache, CacheKeys::new(""));
    let stuck = ExecutionRecord::started("replica-z", &method(), Utc::now() - chrono::Duration::hours(5));
    history.write("report", &stuck, Duration::from_secs(60)).await.unwrap();

    let blocked = guard
        .invoke_with_guard(&job, || async { Ok::<_, JobError>(()) })
        .await
        .unwrap();
    assert_eq!(blocked, None);
    assert!(guard.lock_holder("report").await.unwrap().is_none());

    guard.clear_history("report").await.unwrap();
    assert!(guard.last_execution("report").await.unwrap().is_none());

    let ran = guard
        .invoke_with_guard(&job, || async { Ok::<_, JobError>(()) })
        .await
        .unwrap();
    assert_eq!(ran, Some(()));
}

#[tokio::test]
async fn test_key_prefix_namespaces_cache_entries() {
    let cache = Arc::new(MemoryCache::new());
    let guard = JobGuard::new(
        cache.clone(),
        GuardSettings::new("replica-a").with_key_prefix("svc:"),
    );
    let job = hourly_job("report");

    guard
        .invoke_with_guard(&job, || async { Ok::<_, JobError>(()) })
        .await
        .unwrap();

    assert!(cache.get("svc:jobInfo-report").await.unwrap().is_some());
    assert!(cache.get("jobInfo-report").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_key_with_other_method_is_rejected() {
    let cache = Arc::new(MemoryCache::new());
    let guard = guard_over(cache, "replica-a");
    let job = hourly_job("report");
    guard.register(&job).unwrap();

    let other = GuardedJob::new(
        "report",
        JobMethod::new("BillingJobs", "settle"),
        30,
        ScheduleSpec::default().with_fixed_rate(Duration::from_secs(60)),
    )
    .unwrap();

    let calls = AtomicUsize::new(0);
    let err = guard
        .invoke_with_guard(&other, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, JobError>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::DuplicateKey { .. }));
    assert!(err.is_configuration());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(guard.registry().len(), 1);
}

#[tokio::test]
async fn test_history_read_failure_releases_lock() {
    let mut cache = MockCache::new();
    cache.expect_set_if_absent().times(1).returning(|_, _, _| Ok(true));
    cache
        .expect_get()
        .times(1)
        .returning(|_| Err(CacheError::Backend("connection reset".to_string())));
    cache
        .expect_remove()
        .withf(|key| key.starts_with("lock-"))
        .times(1)
        .returning(|_| Ok(()));
    cache.expect_set().never();

    let guard = JobGuard::new(Arc::new(cache), GuardSettings::new("replica-a"));
    let job = hourly_job("report");

    let calls = AtomicUsize::new(0);
    let err = guard
        .invoke_with_guard(&job, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, JobError>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Cache(CacheError::Backend(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_final_write_failure_still_releases_lock() {
    let mut cache = MockCache::new();
    cache.expect_set_if_absent().returning(|_, _, _| Ok(true));
    cache.expect_get().returning(|_| Ok(None));
    let mut writes = 0;
    cache.expect_set().times(2).returning(move |_, _, _| {
        writes += 1;
        if writes == 1 {
            Ok(())
        } else {
            Err(CacheError::Backend("read only replica".to_string()))
        }
    });
    cache.expect_remove().times(1).returning(|_| Ok(()));

    let guard = JobGuard::new(Arc::new(cache), GuardSettings::new("replica-a"));
    let job = hourly_job("report");

    let result = guard
        .invoke_with_guard(&job, || async { Ok::<_, JobError>(5) })
        .await
        .unwrap();
    assert_eq!(result, Some(5));
}

#[tokio::test]
async fn test_lock_denied_does_not_release() {
    let mut cache = MockCache::new();
    cache.expect_set_if_absent().returning(|_, _, _| Ok(false));
    cache.expect_get().returning(|_| Ok(None));
    cache.expect_remove().never();
    cache.expect_set().never();

    let guard = JobGuard::new(Arc::new(cache), GuardSettings::new("replica-b"));
    let result = guard
        .invoke_with_guard(&hourly_job("report"), || async { Ok::<_, JobError>(()) })
        .await
        .unwrap();
    assert_eq!(result, None);
}
