//! Error types for guarded job execution.

use thiserror::Error;

use dsched_cache::CacheError;

use crate::record::RESULT_UNKNOWN_ERROR;
use crate::registry::JobMethod;
use crate::schedule::ScheduleError;

/// Errors raised by the guard.
///
/// The first group are configuration faults: they are raised before the lock
/// is touched and are never retried. Lock denial and not-due ticks are not
/// errors; they surface as `Ok(None)` from
/// [`JobGuard::invoke_with_guard`](crate::JobGuard::invoke_with_guard).
#[derive(Debug, Error)]
pub enum GuardError {
    /// A job was declared with an empty schedule key.
    #[error("Schedule key of {method} cannot be empty")]
    EmptyKey { method: JobMethod },

    /// The schedule key is already bound to another method.
    #[error("Schedule key '{key}' of {method} is already used by {existing}")]
    DuplicateKey {
        key: String,
        method: JobMethod,
        existing: JobMethod,
    },

    /// The job declares no trigger kind at all.
    #[error("Job '{key}' declares no trigger: set cron, fixed_delay or fixed_rate")]
    MissingScheduleDeclaration { key: String },

    /// The schedule could not be resolved or evaluated.
    #[error("Invalid schedule for job '{key}': {source}")]
    InvalidSchedule {
        key: String,
        #[source]
        source: ScheduleError,
    },

    /// Lock expiry must be between one second and one year.
    #[error("Invalid lock expiry for job '{key}': must be between 1 and 31536000 seconds")]
    InvalidLockExpiry { key: String },

    /// The shared cache failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// An execution record could not be encoded or decoded.
    #[error("Execution record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The job body failed. The failure has been recorded in history.
    #[error(transparent)]
    Job(#[from] JobError),
}

impl GuardError {
    /// Whether this is a configuration-time fault.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GuardError::EmptyKey { .. }
                | GuardError::DuplicateKey { .. }
                | GuardError::MissingScheduleDeclaration { .. }
                | GuardError::InvalidSchedule { .. }
                | GuardError::InvalidLockExpiry { .. }
        )
    }
}

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Failure of a job body.
#[derive(Debug, Error)]
pub enum JobError {
    /// A recognized application error with its own result code.
    #[error("[{code}] {message}")]
    Domain { code: String, message: String },

    /// Any other error.
    #[error("{0}")]
    Unclassified(Box<dyn std::error::Error + Send + Sync>),

    /// The job body panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Create a domain failure.
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::Domain {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap any other error.
    pub fn unclassified(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        JobError::Unclassified(err.into())
    }

    /// Result code stored in the execution record.
    pub fn result_code(&self) -> &str {
        match self {
            JobError::Domain { code, .. } => code,
            JobError::Unclassified(_) | JobError::Panicked(_) => RESULT_UNKNOWN_ERROR,
        }
    }

    /// Message stored in the execution record.
    pub fn message(&self) -> String {
        match self {
            JobError::Domain { message, .. } => message.clone(),
            JobError::Unclassified(err) => err.to_string(),
            JobError::Panicked(msg) => msg.clone(),
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Unclassified(Box::new(err))
    }
}
