//! # Circuit Breaker Settings
//!
//! Per-circuit thresholds. System-wide breaker configuration (enablement,
//! per-component overrides) lives in `crate::config::CircuitBreakerConfig`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds for a single circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time spent open before a trial call is allowed
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Settings suited to outbound AI model calls
    pub fn for_ai_model() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
        }
    }

    /// Settings suited to the distributed cache store
    pub fn for_distributed_cache() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 15_000,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.reset_timeout_ms == 0 {
            return Err("reset_timeout_ms must be greater than 0".to_string());
        }

        if self.reset_timeout_ms > 600_000 {
            return Err("reset_timeout_ms should not exceed 600000".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

/// Call-site options for `CircuitBreakerManager::with_circuit_breaker`
///
/// `settings` only applies when the named circuit does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerOptions {
    pub circuit_name: String,
    #[serde(default)]
    pub settings: Option<CircuitBreakerSettings>,
}

impl CircuitBreakerOptions {
    pub fn new(circuit_name: impl Into<String>) -> Self {
        Self {
            circuit_name: circuit_name.into(),
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: CircuitBreakerSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}
