//! # Resilience Module
//!
//! Primitives wrapped around risky calls (supplier price lookups, AI model
//! requests, database access):
//!
//! - **Timeout Guard**: stop waiting after a deadline without cancelling the work
//! - **Retry Executor**: bounded exponential backoff gated by error kind
//! - **Circuit Breakers**: fail fast on dependencies that keep failing
//! - **Fallback Chain**: ordered alternatives with an aggregated failure
//!
//! Every primitive surfaces its terminal failure as a
//! [`ReliabilityError`](crate::error::ReliabilityError) and never swallows it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estimator_core::error::{ErrorKind, ReliabilityError};
//! use estimator_core::resilience::{with_retry, CircuitBreaker, CircuitBreakerSettings, RetryPolicy};
//!
//! # async fn example() -> estimator_core::error::Result<()> {
//! let breaker = CircuitBreaker::new("supplier_prices".to_string(), CircuitBreakerSettings::default());
//! let policy = RetryPolicy::default();
//!
//! let price = with_retry("supplier_prices", &policy, || {
//!     breaker.call(|| async {
//!         Ok::<_, ReliabilityError>(42.0_f64)
//!     })
//! })
//! .await?;
//! # let _ = price;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod fallback;
pub mod manager;
pub mod metrics;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::{CircuitBreakerOptions, CircuitBreakerSettings};
pub use fallback::{boxed_operation, with_fallback, BoxedOperation, FallbackAttempt, FallbackChain};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{with_retry, RetryPolicy};
pub use timeout::with_timeout;
