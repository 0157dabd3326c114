//! Error type shared by every cache backend.

use std::time::Duration;

/// Error type for cache backend operations.
///
/// These never reach callers of [`CacheService`](crate::CacheService): the
/// orchestrator logs them and falls back to the in-process store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP key-value store error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP key-value store returned status {status} for {key}")]
    HttpStatus { status: u16, key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    /// True for failures to encode or decode a value, as opposed to the
    /// backend being unreachable.
    pub fn is_serialization(&self) -> bool {
        matches!(self, CacheError::Serialization(_))
    }
}
