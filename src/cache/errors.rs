//! Cache error types

use crate::error::ErrorKind;
use thiserror::Error;

/// Errors that can occur during cache tier operations
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Failed to connect to cache backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Cache operation timed out
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Persistent tier filesystem failure
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// Requested tier is not configured on this cache
    #[error("Cache tier not configured: {0}")]
    TierUnavailable(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::ConnectionError(_) => ErrorKind::Network,
            CacheError::Timeout(_) => ErrorKind::Timeout,
            CacheError::SerializationError(_) => ErrorKind::DataCorruption,
            CacheError::Io(_) | CacheError::TierUnavailable(_) | CacheError::BackendError(_) => {
                ErrorKind::Processing
            }
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        CacheError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::SerializationError(error.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
