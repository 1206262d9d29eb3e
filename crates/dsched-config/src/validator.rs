//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{has_text, CacheBackend, Config, JobConfig, MAX_LOCK_EXPIRY_SECONDS};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
///
/// Checks the declared shape only. Placeholder resolution and cron parsing
/// happen when the schedules are resolved.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_guard(config, &mut result);
        Self::validate_cache(config, &mut result);

        let mut seen = HashSet::new();
        for (index, job) in config.jobs.iter().enumerate() {
            Self::validate_job(index, job, &mut seen, &mut result);
        }

        if config.jobs.is_empty() {
            result.add_warning(ValidationWarning::new("jobs", "No jobs configured"));
        }

        Ok(result)
    }

    fn validate_guard(config: &Config, result: &mut ValidationResult) {
        if let Some(id) = &config.guard.instance_id {
            if id.trim().is_empty() {
                result.add_error(ValidationError::new(
                    "guard.instance_id",
                    "instance_id cannot be blank",
                ));
            }
        }

        if config.guard.tolerance_ms > 1000 {
            result.add_warning(ValidationWarning::new(
                "guard.tolerance_ms",
                "tolerance is above 1s; replicas may run a job early, synchronize clocks instead",
            ));
        }
    }

    fn validate_cache(config: &Config, result: &mut ValidationResult) {
        match config.cache.backend {
            CacheBackend::Redis => {
                if config.cache.url.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        "cache.url",
                        "url is required for the redis backend",
                    ));
                }
            }
            CacheBackend::Memory => {
                result.add_warning(ValidationWarning::new(
                    "cache.backend",
                    "memory backend does not coordinate across replicas",
                ));
            }
        }
    }

    fn validate_job(
        index: usize,
        job: &JobConfig,
        seen: &mut HashSet<String>,
        result: &mut ValidationResult,
    ) {
        let path = format!("jobs[{}]", index);

        if job.key.is_empty() {
            result.add_error(ValidationError::new(
                format!("{}.key", path),
                "key cannot be empty",
            ));
        } else if !seen.insert(job.key.clone()) {
            result.add_error(ValidationError::new(
                format!("{}.key", path),
                format!("key '{}' is used by another job", job.key),
            ));
        }

        if job.lock_expiry_seconds == 0 {
            result.add_error(ValidationError::new(
                format!("{}.lock_expiry_seconds", path),
                "lock_expiry_seconds must be greater than 0",
            ));
        } else if job.lock_expiry_seconds > MAX_LOCK_EXPIRY_SECONDS {
            result.add_error(ValidationError::new(
                format!("{}.lock_expiry_seconds", path),
                format!("lock_expiry_seconds must not exceed {}", MAX_LOCK_EXPIRY_SECONDS),
            ));
        }

        let schedule = &job.schedule;
        if !schedule.has_trigger() {
            result.add_error(ValidationError::new(
                path.clone(),
                "no trigger declared: set cron, fixed_delay or fixed_rate",
            ));
        }

        if schedule.fixed_delay_ms.is_some() && has_text(&schedule.fixed_delay_expression) {
            result.add_error(ValidationError::new(
                format!("{}.fixed_delay_expression", path),
                "set either fixed_delay_ms or fixed_delay_expression, not both",
            ));
        }

        if schedule.fixed_rate_ms.is_some() && has_text(&schedule.fixed_rate_expression) {
            result.add_error(ValidationError::new(
                format!("{}.fixed_rate_expression", path),
                "set either fixed_rate_ms or fixed_rate_expression, not both",
            ));
        }

        if has_text(&schedule.zone) && !has_text(&schedule.cron) {
            result.add_warning(ValidationWarning::new(
                format!("{}.zone", path),
                "zone has no effect without cron",
            ));
        }

        if !has_text(&job.command) {
            result.add_error(ValidationError::new(
                format!("{}.command", path),
                "command is required",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
