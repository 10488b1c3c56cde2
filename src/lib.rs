#![allow(clippy::doc_markdown)] // Allow technical terms like TTL, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Estimator Core
//!
//! Reliability core for the contractor estimation backend.
//!
//! ## Overview
//!
//! The estimation workflow leans on slow and flaky collaborators: AI model
//! calls for dimension extraction, supplier pricing APIs, the quote database.
//! This crate keeps those calls fast and survivable:
//!
//! - **Tiered caching**: memory, on-disk and distributed tiers behind one
//!   read-cascade / fan-out-write facade with per-tier hit statistics
//! - **Resilience primitives**: circuit breakers, bounded retries with
//!   exponential backoff, timeouts and fallback chains
//! - **Error recovery**: classification of unrecovered failures into retry,
//!   alert, escalation, recovery or log strategies, with deduplicated
//!   recovery actions and error-rate monitoring
//!
//! ## Module Organization
//!
//! - [`cache`] - Tiered cache engine and tier implementations
//! - [`resilience`] - Circuit breakers, retry, timeout and fallback
//! - [`recovery`] - Error classification, ledger, coordinator and monitor
//! - [`config`] - Layered TOML and environment configuration
//! - [`events`] - Topic publisher for outbound signals and inbound reports
//! - [`system`] - [`ReliabilityCore`] wiring and lifecycle
//! - [`error`] - Crate error type and the error-kind taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use estimator_core::{ErrorKind, ReliabilityCore, ReliabilityError, TierKind};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> estimator_core::Result<()> {
//! estimator_core::logging::init_structured_logging();
//! let core = ReliabilityCore::builder().build().await?;
//! core.start();
//!
//! let quote = core
//!     .cache()
//!     .warm(
//!         "quote:fence:120ft",
//!         || async { Ok(json!({"total": 4180.0})) },
//!         Some(Duration::from_secs(600)),
//!         &[TierKind::Memory, TierKind::Persistent],
//!     )
//!     .await?;
//!
//! let prices = core
//!     .circuit_breakers()
//!     .call("supplier_pricing", || async {
//!         Err::<f64, _>(ReliabilityError::operation(ErrorKind::Network, "supplier offline"))
//!     })
//!     .await;
//! # let _ = (quote, prices);
//!
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod recovery;
pub mod resilience;
pub mod system;

pub use cache::{CacheStats, TierKind, TieredCache};
pub use config::{ConfigManager, ReliabilityConfig};
pub use error::{ErrorKind, ReliabilityError, Result, RetryCategory};
pub use events::EventPublisher;
pub use recovery::{ErrorEvent, ErrorHandler, RecoveryCoordinator, Strategy, StrategyAction};
pub use resilience::{
    with_fallback, with_retry, with_timeout, CircuitBreaker, CircuitBreakerManager,
    CircuitState, RetryPolicy,
};
pub use system::{ReliabilityCore, ReliabilityCoreBuilder, SystemStatus};
