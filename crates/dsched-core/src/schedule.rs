//! Resolved trigger specification of a guarded job.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use dsched_config::{ConfigError, PlaceholderResolver, ScheduleDeclaration};

/// Reasons a schedule cannot be resolved or evaluated.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// No trigger kind is present.
    #[error("no trigger kind configured")]
    NoTrigger,

    #[error("invalid cron expression \"{expression}\": {message}")]
    InvalidCron { expression: String, message: String },

    #[error("unknown time zone \"{0}\"")]
    InvalidZone(String),

    #[error("{field} must be a whole number of milliseconds, got \"{value}\"")]
    InvalidDuration { field: &'static str, value: String },

    /// Both the numeric and the expression form of one trigger kind are set.
    #[error("{0} is declared both as a number and as an expression")]
    ConflictingForms(&'static str),

    /// A computed instant falls outside the supported calendar range.
    #[error("next eligible instant is out of range")]
    OutOfRange,

    #[error(transparent)]
    Placeholder(#[from] ConfigError),
}

/// Cron trigger evaluated in a fixed time zone.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: cron::Schedule,
    zone: Option<Tz>,
}

impl CronTrigger {
    /// Parse a six- or seven-field cron expression (seconds first).
    ///
    /// `zone` is an IANA name; `None` evaluates in the process-local zone.
    pub fn parse(expression: &str, zone: Option<&str>) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        let schedule = cron::Schedule::from_str(expression).map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        let zone = match zone.map(str::trim).filter(|z| !z.is_empty()) {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|_| ScheduleError::InvalidZone(name.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            zone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    /// First fire instant strictly after `after`, if the expression has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.zone {
            Some(tz) => self
                .schedule
                .after(&after.with_timezone(&tz))
                .next()
                .map(|t| t.with_timezone(&Utc)),
            None => self
                .schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.zone {
            Some(tz) => write!(f, "cron \"{}\" ({})", self.expression, tz.name()),
            None => write!(f, "cron \"{}\" (local)", self.expression),
        }
    }
}

/// The trigger kinds declared for a job, with placeholders resolved.
///
/// Several kinds may be present at once; the job may run as soon as any one
/// of them allows it.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec {
    pub cron: Option<CronTrigger>,
    /// Minimum gap between the end of one run and the start of the next.
    pub fixed_delay: Option<Duration>,
    /// Minimum gap between the starts of consecutive runs.
    pub fixed_rate: Option<Duration>,
}

impl ScheduleSpec {
    pub fn with_cron(mut self, cron: CronTrigger) -> Self {
        self.cron = Some(cron);
        self
    }

    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.fixed_delay = Some(delay);
        self
    }

    pub fn with_fixed_rate(mut self, rate: Duration) -> Self {
        self.fixed_rate = Some(rate);
        self
    }

    /// Whether no trigger kind is present.
    pub fn is_empty(&self) -> bool {
        self.cron.is_none() && self.fixed_delay.is_none() && self.fixed_rate.is_none()
    }

    /// Resolve a declaration, substituting `${...}` placeholders first.
    pub fn resolve(
        declaration: &ScheduleDeclaration,
        resolver: &PlaceholderResolver,
    ) -> Result<Self, ScheduleError> {
        let mut spec = ScheduleSpec::default();

        if let Some(expression) = resolver.resolve_opt(declaration.cron.as_deref())? {
            let zone = resolver.resolve_opt(declaration.zone.as_deref())?;
            spec.cron = Some(CronTrigger::parse(&expression, zone.as_deref())?);
        }

        spec.fixed_delay = resolve_millis(
            "fixed_delay",
            declaration.fixed_delay_ms,
            declaration.fixed_delay_expression.as_deref(),
            resolver,
        )?;

        spec.fixed_rate = resolve_millis(
            "fixed_rate",
            declaration.fixed_rate_ms,
            declaration.fixed_rate_expression.as_deref(),
            resolver,
        )?;

        if spec.is_empty() {
            return Err(ScheduleError::NoTrigger);
        }
        Ok(spec)
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(cron) = &self.cron {
            parts.push(cron.to_string());
        }
        if let Some(delay) = self.fixed_delay {
            parts.push(format!("fixed delay {}ms", delay.as_millis()));
        }
        if let Some(rate) = self.fixed_rate {
            parts.push(format!("fixed rate {}ms", rate.as_millis()));
        }
        if parts.is_empty() {
            write!(f, "<no trigger>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

fn resolve_millis(
    field: &'static str,
    numeric: Option<u64>,
    expression: Option<&str>,
    resolver: &PlaceholderResolver,
) -> Result<Option<Duration>, ScheduleError> {
    let resolved = resolver.resolve_opt(expression)?;
    match (numeric, resolved) {
        (Some(_), Some(_)) => Err(ScheduleError::ConflictingForms(field)),
        (Some(ms), None) => Ok(Some(Duration::from_millis(ms))),
        (None, Some(text)) => text
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ScheduleError::InvalidDuration { field, value: text }),
        (None, None) => Ok(None),
    }
}
