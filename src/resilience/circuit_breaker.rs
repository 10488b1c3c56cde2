//! # Circuit Breaker Implementation
//!
//! Fault isolation for named dependencies. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (one trial
//! call probing recovery).
//!
//! The Open to Half-Open transition is evaluated lazily on the next call once
//! the reset timeout has elapsed since the last failure. While half-open,
//! exactly one trial runs; concurrent callers are rejected until it settles.
//! A trial future dropped before completion counts as a failed trial.

use crate::error::{ReliabilityError, Result};
use crate::resilience::{CircuitBreakerMetrics, CircuitBreakerSettings};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - calls fail fast without executing
    Open,
    /// Testing recovery - a single trial call is allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of a circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    consecutive_failures: u32,
    /// Monotonic timestamp driving the reset timeout
    last_failure_instant: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            status: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_instant: None,
            last_failure_at: None,
            last_success_at: None,
            trial_in_flight: false,
            metrics: CircuitBreakerMetrics::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

type Transition = Option<(CircuitState, CircuitState)>;

/// Circuit breaker guarding one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: String, settings: CircuitBreakerSettings) -> Self {
        info!(
            circuit = %name,
            failure_threshold = settings.failure_threshold,
            reset_timeout_ms = settings.reset_timeout_ms,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            settings,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &CircuitBreakerSettings {
        &self.settings
    }

    /// Current state without evaluating the reset timeout
    pub fn state(&self) -> CircuitState {
        self.state.lock().status
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Rejected calls return [`ReliabilityError::CircuitOpen`] and never run
    /// `operation`. The operation's own error is returned unchanged.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed();
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(duration),
            Err(e) => {
                debug!(circuit = %self.name, error = %e, "Guarded operation failed");
                self.record_failure(duration);
            }
        }

        result
    }

    fn admit(&self) -> Result<Admission> {
        let mut state = self.state.lock();

        let admission = match state.status {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_instant
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);

                if elapsed >= self.settings.reset_timeout() {
                    state.status = CircuitState::HalfOpen;
                    state.trial_in_flight = true;
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen => None,
        };

        match admission {
            Some(admission) => {
                drop(state);
                if admission == Admission::Trial {
                    info!(circuit = %self.name, "🟡 Circuit breaker half-open (testing recovery)");
                }
                Ok(admission)
            }
            None => {
                state.metrics.rejected_count += 1;
                let status = state.status;
                drop(state);
                debug!(circuit = %self.name, state = %status, "Call rejected by circuit breaker");
                Err(ReliabilityError::CircuitOpen {
                    circuit: self.name.clone(),
                })
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        let transition: Transition = {
            let mut state = self.state.lock();
            state.metrics.record(duration, true);
            state.last_success_at = Some(Utc::now());

            match state.status {
                CircuitState::HalfOpen => {
                    state.status = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.trial_in_flight = false;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                }
                CircuitState::Closed => {
                    state.consecutive_failures = 0;
                    None
                }
                // Forced open while the call was running
                CircuitState::Open => None,
            }
        };

        debug!(circuit = %self.name, duration_ms = duration.as_millis() as u64, "🟢 Operation succeeded");
        self.log_transition(transition);
    }

    fn record_failure(&self, duration: Duration) {
        let transition: Transition = {
            let mut state = self.state.lock();
            state.metrics.record(duration, false);
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_failure_instant = Some(Instant::now());
            state.last_failure_at = Some(Utc::now());

            match state.status {
                CircuitState::HalfOpen => {
                    state.status = CircuitState::Open;
                    state.trial_in_flight = false;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Closed
                    if state.consecutive_failures >= self.settings.failure_threshold =>
                {
                    state.status = CircuitState::Open;
                    Some((CircuitState::Closed, CircuitState::Open))
                }
                _ => None,
            }
        };

        self.log_transition(transition);
    }

    fn log_transition(&self, transition: Transition) {
        match transition {
            Some((_, CircuitState::Open)) => error!(
                circuit = %self.name,
                failure_threshold = self.settings.failure_threshold,
                reset_timeout_ms = self.settings.reset_timeout_ms,
                "🔴 Circuit breaker opened (failing fast)"
            ),
            Some((_, CircuitState::Closed)) => {
                info!(circuit = %self.name, "🟢 Circuit breaker closed (recovered)")
            }
            _ => {}
        }
    }

    /// Force circuit to open state; the reset timeout starts now
    pub fn force_open(&self) {
        {
            let mut state = self.state.lock();
            state.status = CircuitState::Open;
            state.trial_in_flight = false;
            state.last_failure_instant = Some(Instant::now());
            state.last_failure_at = Some(Utc::now());
        }
        warn!(circuit = %self.name, "🚨 Circuit breaker forced open");
    }

    /// Force circuit to closed state and clear the failure count
    pub fn force_closed(&self) {
        {
            let mut state = self.state.lock();
            state.status = CircuitState::Closed;
            state.trial_in_flight = false;
            state.consecutive_failures = 0;
        }
        warn!(circuit = %self.name, "🚨 Circuit breaker forced closed");
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: state.status,
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
            last_success_at: state.last_success_at,
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        state
            .metrics
            .clone()
            .finalize(state.status, state.consecutive_failures)
    }

    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}

/// Marks a half-open trial failed if its future is dropped mid-flight
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(circuit = %self.breaker.name, "Half-open trial abandoned before completion");
            self.breaker.record_failure(Duration::ZERO);
        }
    }
}
