//! # System Constants
//!
//! Topic names for the outbound signals the reliability core publishes, and the
//! default limits used when configuration does not override them.

/// Pub/sub topics
pub mod topics {
    /// Deferred or immediate retry-dispatch requests
    pub const RETRY_DISPATCH: &str = "errors.retry";
    /// High and critical severity alerts
    pub const ALERT_CRITICAL: &str = "alerts.critical";
    /// Low and medium severity alerts
    pub const ALERT_NORMAL: &str = "alerts.normal";
    /// Support-ticket creation requests
    pub const SUPPORT_TICKET: &str = "support.ticket.create";
    /// Recovery-action requests for the remediation collaborator
    pub const RECOVERY_ACTION: &str = "recovery.action";
    /// Per-service error-rate threshold breaches
    pub const HIGH_ERROR_RATE: &str = "alerts.high_error_rate";
    /// Periodic error summaries
    pub const ERROR_SUMMARY: &str = "errors.summary";
    /// Inbound failure reports from business collaborators
    pub const ERROR_REPORTED: &str = "errors.reported";
}

/// Default limits
pub mod defaults {
    /// Per-service error log cap
    pub const ERROR_LOG_CAPACITY: usize = 1000;
    /// Error record retention (24h)
    pub const ERROR_RETENTION_SECONDS: u64 = 24 * 60 * 60;
    /// Trailing window for error-rate checks
    pub const ERROR_RATE_WINDOW_SECONDS: u64 = 60;
    pub const ERROR_RATE_CHECK_INTERVAL_SECONDS: u64 = 60;
    pub const ERROR_CLEANUP_INTERVAL_SECONDS: u64 = 60 * 60;
    pub const ERROR_SUMMARY_INTERVAL_SECONDS: u64 = 60 * 60;
    /// Errors per window that trigger a high-error-rate alert
    pub const ERROR_RATE_THRESHOLD: usize = 10;

    pub const MEMORY_TTL_SECONDS: u64 = 300;
    pub const MEMORY_MAX_ENTRIES: usize = 1000;
    pub const PERSISTENT_TTL_SECONDS: u64 = 24 * 60 * 60;
    pub const DISTRIBUTED_TTL_SECONDS: u64 = 60 * 60;
    pub const CACHE_SWEEP_INTERVAL_SECONDS: u64 = 10 * 60;
    /// Share of the memory tier evicted when it overflows
    pub const MEMORY_EVICTION_FRACTION: f64 = 0.2;
    /// Raw keys longer than this are hashed
    pub const MAX_KEY_LENGTH: usize = 128;

    pub const ADVISOR_TIMEOUT_MS: u64 = 5_000;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

    /// Recovery action used when a retry budget runs out and nothing more specific is mapped
    pub const RETRIES_EXHAUSTED_ACTION: &str = "retries_exhausted";

    /// Recovery action for `recover` strategies with no mapped action
    pub const GENERIC_RECOVERY_ACTION: &str = "generic_recovery";

    /// Finished recovery attempts kept for inspection
    pub const RECOVERY_HISTORY_CAPACITY: usize = 256;
}
