//! Per-process trigger drivers.
//!
//! Every replica drives the same triggers locally. Each tick goes through
//! [`JobGuard::invoke_with_guard`], so the body runs on at most one replica.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use dsched_core::{CronTrigger, GuardError, GuardedJob, JobError, JobGuard, ScheduleSpec};

/// Work executed when a tick wins the guard.
#[async_trait]
pub(crate) trait JobBody: Send + Sync {
    async fn execute(&self) -> Result<String, JobError>;
}

/// One trigger kind of a job, driven by its own loop.
#[derive(Debug, Clone)]
pub(crate) enum Trigger {
    Cron(CronTrigger),
    FixedRate(Duration),
    FixedDelay(Duration),
}

impl Trigger {
    /// One driver per trigger kind present in `spec`.
    pub(crate) fn all_of(spec: &ScheduleSpec) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        if let Some(cron) = &spec.cron {
            triggers.push(Trigger::Cron(cron.clone()));
        }
        if let Some(rate) = spec.fixed_rate {
            triggers.push(Trigger::FixedRate(rate));
        }
        if let Some(delay) = spec.fixed_delay {
            triggers.push(Trigger::FixedDelay(delay));
        }
        triggers
    }
}

/// What a single tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Ran,
    Skipped,
    Failed,
}

/// Drives one guarded job.
pub(crate) struct JobRunner {
    guard: Arc<JobGuard>,
    job: GuardedJob,
    body: Arc<dyn JobBody>,
    initial_delay: Duration,
}

impl JobRunner {
    pub(crate) fn new(guard: Arc<JobGuard>, job: GuardedJob, body: Arc<dyn JobBody>) -> Self {
        Self {
            guard,
            job,
            body,
            initial_delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Invoke the body through the guard once.
    pub(crate) async fn tick(&self) -> TickOutcome {
        let key = self.job.key();
        match self
            .guard
            .invoke_with_guard(&self.job, || self.body.execute())
            .await
        {
            Ok(Some(output)) => {
                if !output.is_empty() {
                    info!(schedule_key = key, "Job output: {}", output);
                }
                TickOutcome::Ran
            }
            Ok(None) => TickOutcome::Skipped,
            // Already logged and recorded by the guard.
            Err(GuardError::Job(_)) => TickOutcome::Failed,
            Err(e) => {
                error!(schedule_key = key, "Guarded invocation failed: {}", e);
                TickOutcome::Failed
            }
        }
    }

    /// Drive `trigger` until `cancel` changes.
    pub(crate) async fn run(self: Arc<Self>, trigger: Trigger, cancel: watch::Receiver<bool>) {
        let key = self.job.key().to_string();
        info!(schedule_key = %key, trigger = ?trigger, "Trigger driver started");

        let mut cancel = cancel;
        if !self.initial_delay.is_zero() {
            tokio::select! {
                _ = time::sleep(self.initial_delay) => {}
                _ = cancel.changed() => {
                    info!(schedule_key = %key, "Trigger driver shutting down");
                    return;
                }
            }
        }

        match trigger {
            Trigger::Cron(cron) => self.drive_cron(&cron, &mut cancel).await,
            Trigger::FixedRate(rate) => self.drive_fixed_rate(rate, &mut cancel).await,
            Trigger::FixedDelay(delay) => self.drive_fixed_delay(delay, &mut cancel).await,
        }

        info!(schedule_key = %key, "Trigger driver shutting down");
    }

    async fn drive_cron(&self, cron: &CronTrigger, cancel: &mut watch::Receiver<bool>) {
        loop {
            let Some(wait) = delay_until_next(cron, Utc::now()) else {
                info!(schedule_key = self.job.key(), "{} has no upcoming fire time", cron);
                let _ = cancel.changed().await;
                return;
            };
            debug!(schedule_key = self.job.key(), "Next cron fire in {:?}", wait);

            tokio::select! {
                _ = time::sleep(wait) => {
                    self.tick().await;
                }
                _ = cancel.changed() => return,
            }
        }
    }

    async fn drive_fixed_rate(&self, rate: Duration, cancel: &mut watch::Receiver<bool>) {
        // A zero period is rejected by tokio's interval.
        let period = rate.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now(), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = cancel.changed() => return,
            }
        }
    }

    async fn drive_fixed_delay(&self, delay: Duration, cancel: &mut watch::Receiver<bool>) {
        loop {
            self.tick().await;
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel.changed() => return,
            }
        }
    }
}

/// Time from `now` until the next fire of `cron`.
pub(crate) fn delay_until_next(cron: &CronTrigger, now: DateTime<Utc>) -> Option<Duration> {
    let next = cron.next_after(now)?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
