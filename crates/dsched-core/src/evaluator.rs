//! Decides whether a guarded job is due, from its last execution record.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::record::ExecutionRecord;
use crate::schedule::{ScheduleError, ScheduleSpec};

/// Default clock skew tolerated between replicas.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(10);

/// Pure due-ness check over a [`ScheduleSpec`] and the last [`ExecutionRecord`].
pub struct ScheduleEvaluator;

impl ScheduleEvaluator {
    /// Whether a new run may start at `now`.
    ///
    /// - no record: due (first run, or the record was evicted)
    /// - record missing `begin_time` or `end_time`: never due, the previous
    ///   run did not complete and the record is not trusted
    /// - otherwise due iff `earliest - tolerance <= now`, where `earliest` is
    ///   the minimum over the present trigger kinds of
    ///   cron: next fire after `end_time`; fixed delay: `end_time + delay`;
    ///   fixed rate: `begin_time + rate`
    pub fn is_due(
        spec: &ScheduleSpec,
        last: Option<&ExecutionRecord>,
        now: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<bool, ScheduleError> {
        if spec.is_empty() {
            return Err(ScheduleError::NoTrigger);
        }

        let Some(last) = last else {
            return Ok(true);
        };

        let (Some(begin), Some(end)) = (last.begin_time, last.end_time) else {
            return Ok(false);
        };

        let Some(earliest) = Self::earliest_candidate(spec, begin, end)? else {
            // Only a cron trigger with no future fire time.
            return Ok(false);
        };

        let threshold = earliest
            .checked_sub_signed(to_delta(tolerance)?)
            .ok_or(ScheduleError::OutOfRange)?;
        Ok(threshold <= now)
    }

    /// Earliest instant any present trigger kind allows the next run.
    pub fn earliest_candidate(
        spec: &ScheduleSpec,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        if spec.is_empty() {
            return Err(ScheduleError::NoTrigger);
        }

        let mut earliest: Option<DateTime<Utc>> = None;
        let mut consider = |candidate: DateTime<Utc>| {
            earliest = Some(match earliest {
                Some(current) if current <= candidate => current,
                _ => candidate,
            });
        };

        if let Some(cron) = &spec.cron {
            if let Some(next) = cron.next_after(end) {
                consider(next);
            }
        }

        if let Some(delay) = spec.fixed_delay {
            consider(add(end, delay)?);
        }

        if let Some(rate) = spec.fixed_rate {
            consider(add(begin, rate)?);
        }

        Ok(earliest)
    }
}

fn to_delta(duration: Duration) -> Result<TimeDelta, ScheduleError> {
    TimeDelta::from_std(duration).map_err(|_| ScheduleError::OutOfRange)
}

fn add(instant: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>, ScheduleError> {
    instant
        .checked_add_signed(to_delta(duration)?)
        .ok_or(ScheduleError::OutOfRange)
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
