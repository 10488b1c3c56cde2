//! # Error Types
//!
//! A single crate-level error, [`ReliabilityError`], plus the closed [`ErrorKind`]
//! taxonomy that the retry gate and the error classifier key off.

use crate::cache::CacheError;
use crate::resilience::fallback::FallbackAttempt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Closed classification of a failure's nature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Third-party API call failed
    ExternalApi,
    /// Database read or write failed
    Database,
    /// AI model call failed or returned unusable output
    AiModel,
    /// Local processing step failed
    Processing,
    /// Operation exceeded its deadline
    Timeout,
    /// Connection-level failure
    Network,
    /// Upstream throttled the caller
    RateLimit,
    /// Upstream reported itself overloaded
    ServerBusy,
    /// Credentials rejected
    Authentication,
    /// Stored or received data failed integrity checks
    DataCorruption,
    /// Memory, disk, quota or pool exhausted
    ResourceExhaustion,
    /// Security policy violation
    Security,
    /// Input rejected by validation
    Validation,
    /// Call short-circuited by an open circuit breaker
    CircuitOpen,
    /// Nothing more specific is known
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::ExternalApi,
        ErrorKind::Database,
        ErrorKind::AiModel,
        ErrorKind::Processing,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::RateLimit,
        ErrorKind::ServerBusy,
        ErrorKind::Authentication,
        ErrorKind::DataCorruption,
        ErrorKind::ResourceExhaustion,
        ErrorKind::Security,
        ErrorKind::Validation,
        ErrorKind::CircuitOpen,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExternalApi => "external_api",
            ErrorKind::Database => "database",
            ErrorKind::AiModel => "ai_model",
            ErrorKind::Processing => "processing",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerBusy => "server_busy",
            ErrorKind::Authentication => "authentication",
            ErrorKind::DataCorruption => "data_corruption",
            ErrorKind::ResourceExhaustion => "resource_exhaustion",
            ErrorKind::Security => "security",
            ErrorKind::Validation => "validation",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transient kinds are worth retrying without human involvement
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::ServerBusy
        )
    }

    /// Critical kinds are never blindly retried
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ErrorKind::Authentication
                | ErrorKind::DataCorruption
                | ErrorKind::ResourceExhaustion
                | ErrorKind::Security
        )
    }

    /// Retry policy family this kind falls under
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            ErrorKind::Database | ErrorKind::DataCorruption => RetryCategory::Database,
            ErrorKind::AiModel => RetryCategory::AiModel,
            ErrorKind::Processing | ErrorKind::Validation | ErrorKind::ResourceExhaustion => {
                RetryCategory::Processing
            }
            _ => RetryCategory::ExternalApi,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ReliabilityError;

    /// Accepts `rate_limit`, `RATE_LIMIT`, `rate-limit` and `rate limit` alike
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ReliabilityError::Configuration(format!("Unknown error kind: {s}")))
    }
}

/// Retry policy families, each with its own limits in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryCategory {
    ExternalApi,
    Database,
    AiModel,
    Processing,
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCategory::ExternalApi => write!(f, "external-api"),
            RetryCategory::Database => write!(f, "database"),
            RetryCategory::AiModel => write!(f, "ai-model"),
            RetryCategory::Processing => write!(f, "processing"),
        }
    }
}

/// Errors surfaced by the reliability core and by operations run through it
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReliabilityError {
    /// A guarded operation failed with a classified kind
    #[error("{kind} error: {message}")]
    Operation { kind: ErrorKind, message: String },

    #[error("Operation '{operation}' timed out after {}ms", .timeout.as_millis())]
    Timeout { operation: String, timeout: Duration },

    #[error("Circuit breaker is open for {circuit}")]
    CircuitOpen { circuit: String },

    #[error("All {} attempts failed: {}", .attempts.len(), describe_attempts(.attempts))]
    FallbackExhausted { attempts: Vec<FallbackAttempt> },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Event error: {0}")]
    Event(String),

    #[error("Background task error: {0}")]
    TaskJoin(String),
}

impl ReliabilityError {
    /// Convenience constructor for failures raised by guarded operations
    pub fn operation(kind: ErrorKind, message: impl Into<String>) -> Self {
        ReliabilityError::Operation {
            kind,
            message: message.into(),
        }
    }

    /// Kind used by the retry gate and the classifier
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReliabilityError::Operation { kind, .. } => *kind,
            ReliabilityError::Timeout { .. } => ErrorKind::Timeout,
            ReliabilityError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ReliabilityError::FallbackExhausted { attempts } => attempts
                .last()
                .map(|attempt| attempt.kind)
                .unwrap_or(ErrorKind::Unknown),
            ReliabilityError::Cache(cache_error) => cache_error.kind(),
            ReliabilityError::Configuration(_) => ErrorKind::Validation,
            ReliabilityError::Event(_) | ReliabilityError::TaskJoin(_) => ErrorKind::Processing,
        }
    }

    /// Message without the kind prefix, for error records and alerts
    pub fn message(&self) -> String {
        match self {
            ReliabilityError::Operation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn describe_attempts(attempts: &[FallbackAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.label, attempt.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ReliabilityError>;
