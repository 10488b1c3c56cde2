//! # Retry Executor
//!
//! Bounded retry with exponential backoff. Only errors whose
//! [`ErrorKind`](crate::error::ErrorKind) is in the policy's retryable set are
//! retried; anything else surfaces on the first failure.

use crate::config::{RetryConfig, RetryPolicyConfig};
use crate::error::{ErrorKind, Result, RetryCategory};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Scale each delay by a factor drawn from [0.5, 1.5]
    pub jitter: bool,
    pub max_delay: Duration,
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl RetryPolicy {
    pub fn for_category(category: RetryCategory, config: &RetryConfig) -> Self {
        Self::from(config.policy(category))
    }

    /// Deterministic delay before retry number `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        clamp_delay(millis, self.max_delay)
    }

    /// Delay actually waited, jitter applied when enabled
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        if !self.jitter {
            return self.delay_for_attempt(attempt);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
        let millis =
            self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent) * factor;
        clamp_delay(millis, self.max_delay)
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }
}

fn clamp_delay(millis: f64, max_delay: Duration) -> Duration {
    if !millis.is_finite() || millis >= max_delay.as_millis() as f64 {
        return max_delay;
    }
    Duration::from_millis(millis.max(0.0) as u64)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryPolicyConfig::default())
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
            max_delay: Duration::from_millis(config.max_delay_ms),
            retryable_kinds: config.retryable_kinds.iter().copied().collect(),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable kind, or
/// exhausts `policy.max_retries`
pub async fn with_retry<F, Fut, T>(name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = name, retries = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                let kind = error.kind();

                if !policy.is_retryable(kind) {
                    debug!(operation = name, kind = %kind, "Error not retryable");
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        operation = name,
                        kind = %kind,
                        attempts = attempt + 1,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }

                let delay = policy.jittered_delay(attempt);
                warn!(
                    operation = name,
                    kind = %kind,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "🔄 Retrying after failure"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
