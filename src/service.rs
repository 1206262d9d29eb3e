//! Wiring of configuration, cache backend, guard and trigger drivers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use dsched_cache::{MemoryCache, SharedCache};
use dsched_config::{CacheBackend, Config, ConfigValidator, JobConfig, PlaceholderResolver};
use dsched_core::{GuardSettings, GuardedJob, JobError, JobGuard, JobMethod};

use crate::shell::run_command;
use crate::trigger::{JobBody, JobRunner, Trigger};

/// Job body running a configured shell command.
pub(crate) struct ShellBody {
    command: String,
}

impl ShellBody {
    pub(crate) fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl JobBody for ShellBody {
    async fn execute(&self) -> Result<String, JobError> {
        run_command(&self.command).await
    }
}

/// Validate `config`, logging warnings and failing on errors.
pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config)?;
    for warning in &result.warnings {
        warn!("Config warning at {}: {}", warning.path, warning.message);
    }
    if !result.is_valid() {
        for e in &result.errors {
            error!("Config error at {}: {}", e.path, e.message);
        }
        bail!("configuration has {} error(s)", result.errors.len());
    }
    Ok(())
}

/// Method identity of the `index`-th configured job.
pub(crate) fn job_method(index: usize) -> JobMethod {
    JobMethod::new(format!("jobs[{}]", index), "command")
}

/// Resolve every configured job into a guarded job.
pub(crate) fn resolve_jobs(config: &Config) -> anyhow::Result<Vec<(GuardedJob, &JobConfig)>> {
    let resolver = config.resolver();
    let mut jobs = Vec::with_capacity(config.jobs.len());
    for (index, job) in config.jobs.iter().enumerate() {
        let guarded = GuardedJob::from_config(job, job_method(index), &resolver)
            .with_context(|| format!("invalid job '{}'", job.key))?;
        jobs.push((guarded, job));
    }
    Ok(jobs)
}

/// Build the configured shared cache.
pub(crate) async fn build_cache(
    config: &Config,
    resolver: &PlaceholderResolver,
) -> anyhow::Result<Arc<dyn SharedCache>> {
    match config.cache.backend {
        CacheBackend::Memory => {
            warn!("Using the in-process memory cache: replicas will not coordinate");
            Ok(Arc::new(MemoryCache::new()))
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let url = resolver.resolve(&config.cache.url)?;
            let cache = dsched_cache::RedisCache::connect(&url).await?;
            info!("Connected to Redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            let _ = resolver;
            bail!("cache backend \"redis\" requires dsched to be built with the `redis` feature")
        }
    }
}

/// Build the guard for this process.
pub(crate) async fn build_guard(config: &Config) -> anyhow::Result<Arc<JobGuard>> {
    let resolver = config.resolver();
    let cache = build_cache(config, &resolver).await?;
    let settings = GuardSettings::from_config(&config.guard);
    Ok(Arc::new(JobGuard::new(cache, settings)))
}

/// Drive every configured job until Ctrl-C.
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    info!("Starting dsched v{}", env!("CARGO_PKG_VERSION"));
    validate(&config)?;

    let jobs = resolve_jobs(&config)?;
    let guard = build_guard(&config).await?;
    info!(instance_id = guard.instance_id(), "Guard initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for (job, job_config) in jobs {
        guard.register(&job)?;

        let command = job_config.command.clone().unwrap_or_default();
        let triggers = Trigger::all_of(job.schedule());
        info!(schedule_key = job.key(), schedule = %job.schedule(), "Scheduling job");

        let runner = Arc::new(
            JobRunner::new(guard.clone(), job, Arc::new(ShellBody::new(command)))
                .with_initial_delay(Duration::from_millis(job_config.initial_delay_ms)),
        );
        for trigger in triggers {
            handles.push(tokio::spawn(runner.clone().run(trigger, shutdown_rx.clone())));
        }
    }

    info!("dsched ready: {} trigger driver(s) running", handles.len());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Trigger driver task failed: {}", e);
        }
    }
    Ok(())
}

/// Validate the configuration and print each job's resolved triggers.
pub(crate) fn check(config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config)?;
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for e in &result.errors {
        println!("error:   {}: {}", e.path, e.message);
    }
    if !result.is_valid() {
        bail!("configuration has {} error(s)", result.errors.len());
    }

    for (job, job_config) in resolve_jobs(config)? {
        println!("{}", job.key());
        println!("  Triggers:    {}", job.schedule());
        println!("  Lock expiry: {}s", job.lock_expiry().as_secs());
        if job_config.initial_delay_ms > 0 {
            println!("  First tick:  after {}ms", job_config.initial_delay_ms);
        }
        println!("  Command:     {}", job_config.command.as_deref().unwrap_or(""));
    }
    println!("Configuration OK");
    Ok(())
}

/// Operator commands inspect state left by other processes, which the
/// in-process memory backend never holds.
fn require_shared_backend(config: &Config, command: &str) -> anyhow::Result<()> {
    if config.cache.backend == CacheBackend::Memory {
        bail!(
            "`{}` needs a shared cache backend; the memory backend only lives inside a running dsched process",
            command
        );
    }
    Ok(())
}

/// Print the lock holder and last execution record of `key`.
pub(crate) async fn status(config: &Config, key: &str) -> anyhow::Result<()> {
    require_shared_backend(config, "status")?;
    let guard = build_guard(config).await?;

    match guard.lock_holder(key).await? {
        Some(holder) => println!("Lock:   held by {}", holder),
        None => println!("Lock:   free"),
    }
    match guard.last_execution(key).await? {
        Some(record) => {
            let state = if record.running { "running" } else { "finished" };
            println!("Record: {}", state);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => println!("Record: none"),
    }
    Ok(())
}

/// Remove the execution record of `key`.
pub(crate) async fn clear(config: &Config, key: &str) -> anyhow::Result<()> {
    require_shared_backend(config, "clear")?;
    let guard = build_guard(config).await?;
    guard.clear_history(key).await?;
    println!("Execution record of '{}' cleared", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsched_config::ConfigLoader;

    const CONFIG: &str = r#"
        [guard]
        instance_id = "replica-a"

        [properties]
        "cleanup.delay" = "5000"

        [[jobs]]
        key = "cleanup"
        lock_expiry_seconds = 30
        fixed_delay_expression = "${cleanup.delay}"
        command = "true"

        [[jobs]]
        key = "report"
        lock_expiry_seconds = 60
        cron = "0 0 6 * * *"
        zone = "Europe/Berlin"
        command = "echo report"
    "#;

    #[test]
    fn test_resolve_jobs() {
        let config = ConfigLoader::load_str(CONFIG).unwrap();
        let jobs = resolve_jobs(&config).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].0.schedule().fixed_delay, Some(Duration::from_secs(5)));
        assert_eq!(jobs[1].0.method().to_string(), "jobs[1]::command");
        assert!(jobs[1].0.schedule().cron.is_some());
    }

    #[test]
    fn test_validate_rejects_duplicate_keys() {
        let mut config = ConfigLoader::load_str(CONFIG).unwrap();
        config.jobs[1].key = "cleanup".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_check_reports_bad_cron() {
        let mut config = ConfigLoader::load_str(CONFIG).unwrap();
        config.jobs[1].schedule.cron = Some("at dawn".to_string());
        let err = check(&config).unwrap_err();
        assert!(err.to_string().contains("report"));
    }

    #[tokio::test]
    async fn test_shell_body() {
        let body = ShellBody::new("printf ok");
        assert_eq!(body.execute().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_status_and_clear_refuse_memory_backend() {
        let config = ConfigLoader::load_str(CONFIG).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);

        let err = status(&config, "cleanup").await.unwrap_err();
        assert!(err.to_string().contains("shared cache backend"));
        let err = clear(&config, "cleanup").await.unwrap_err();
        assert!(err.to_string().contains("shared cache backend"));
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_backend_requires_feature() {
        let mut config = ConfigLoader::load_str(CONFIG).unwrap();
        config.cache.backend = CacheBackend::Redis;
        assert!(build_guard(&config).await.is_err());
    }
}
