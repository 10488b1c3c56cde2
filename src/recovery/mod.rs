//! # Error Recovery
//!
//! Classification and recovery orchestration for failures that escaped the
//! resilience primitives.
//!
//! - [`ErrorHandler`] records a reported failure, classifies it and applies the
//!   resulting [`Strategy`]
//! - [`StandardErrorClassifier`] maps failures to strategies, optionally
//!   consulting a [`ClassificationAdvisor`]
//! - [`RecoveryCoordinator`] runs recovery actions with per-(service, action,
//!   session) deduplication and schedules deferred retries
//! - [`ErrorLedger`] keeps a bounded per-service history
//! - [`ErrorRateMonitor`] checks error rates, cleans up and publishes summaries

pub mod classifier;
pub mod coordinator;
pub mod handler;
pub mod ledger;
pub mod monitor;
pub mod types;

pub use classifier::{ClassificationAdvisor, ErrorClassifier, StandardErrorClassifier};
pub use coordinator::{
    PublishingRecoveryDispatcher, RecoveryCoordinator, RecoveryDispatcher, RecoveryKey,
    RecoveryOutcome, RecoveryRecord, RetryDecision,
};
pub use handler::{ErrorHandler, HandledError};
pub use ledger::ErrorLedger;
pub use monitor::{ErrorRateMonitor, MonitorStatsSnapshot};
pub use types::{
    AlertNotification, ErrorContext, ErrorEvent, ErrorRecord, ErrorSummary, HighErrorRateAlert,
    RecoveryRequest, RetryRequest, ServiceErrorSummary, Severity, Strategy, StrategyAction,
    SupportTicketRequest,
};
