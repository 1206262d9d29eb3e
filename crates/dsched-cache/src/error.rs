//! Cache errors.

use thiserror::Error;

/// Cache error types.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Entries must carry a positive time-to-live.
    #[error("Invalid TTL for key '{0}': must be greater than zero")]
    InvalidTtl(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}
