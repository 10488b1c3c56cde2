//! Value types shared by the classifier, coordinator, ledger and monitor,
//! including the payloads published on outbound topics.

use crate::error::{ErrorKind, ReliabilityError, RetryCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Structured context attached to a failure
pub type ErrorContext = HashMap<String, Value>;

/// Inbound failure report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub service: String,
    #[serde(deserialize_with = "lenient_kind")]
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_critical: bool,
    #[serde(default)]
    pub requires_human_intervention: bool,
}

/// Unrecognized kinds become `Unknown` instead of rejecting the report
fn lenient_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ErrorKind, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.parse().unwrap_or(ErrorKind::Unknown))
}

impl ErrorEvent {
    pub fn new(service: impl Into<String>, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            error_kind,
            message: message.into(),
            context: ErrorContext::new(),
            session_id: None,
            timestamp: Utc::now(),
            is_critical: false,
            requires_human_intervention: false,
        }
    }

    /// Report a failure surfaced by one of the resilience primitives
    pub fn from_error(service: impl Into<String>, error: &ReliabilityError) -> Self {
        Self::new(service, error.kind(), error.message())
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    pub fn requiring_human(mut self) -> Self {
        self.requires_human_intervention = true;
        self
    }

    /// Severity assigned at record time, before classification
    pub fn severity(&self) -> Severity {
        if self.is_critical {
            Severity::Critical
        } else if self.error_kind.is_critical() {
            Severity::High
        } else if self.error_kind.is_transient() {
            Severity::Low
        } else {
            Severity::Medium
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyAction {
    Retry,
    Alert,
    Escalate,
    Recover,
    Log,
}

impl fmt::Display for StrategyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyAction::Retry => "retry",
            StrategyAction::Alert => "alert",
            StrategyAction::Escalate => "escalate",
            StrategyAction::Recover => "recover",
            StrategyAction::Log => "log",
        };
        f.write_str(label)
    }
}

/// Classification outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub action: StrategyAction,
    pub retry_category: Option<RetryCategory>,
    pub escalate: bool,
    pub alert_level: Severity,
    pub recovery_action: Option<String>,
}

impl Strategy {
    pub fn retry(category: RetryCategory) -> Self {
        Self {
            action: StrategyAction::Retry,
            retry_category: Some(category),
            escalate: false,
            alert_level: Severity::Low,
            recovery_action: None,
        }
    }

    pub fn alert(alert_level: Severity, escalate: bool) -> Self {
        Self {
            action: StrategyAction::Alert,
            retry_category: None,
            escalate,
            alert_level,
            recovery_action: None,
        }
    }

    pub fn escalate() -> Self {
        Self {
            action: StrategyAction::Escalate,
            retry_category: None,
            escalate: true,
            alert_level: Severity::Medium,
            recovery_action: None,
        }
    }

    pub fn recover(action: impl Into<String>) -> Self {
        Self {
            action: StrategyAction::Recover,
            retry_category: None,
            escalate: false,
            alert_level: Severity::Medium,
            recovery_action: Some(action.into()),
        }
    }

    pub fn log() -> Self {
        Self {
            action: StrategyAction::Log,
            retry_category: None,
            escalate: false,
            alert_level: Severity::Low,
            recovery_action: None,
        }
    }

    pub fn with_recovery_action(mut self, action: Option<String>) -> Self {
        self.recovery_action = action;
        self
    }
}

/// Ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub service: String,
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub handled: bool,
    pub severity: Severity,
}

impl ErrorRecord {
    pub fn from_event(event: &ErrorEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: event.service.clone(),
            kind: event.error_kind,
            message: event.message.clone(),
            context: event.context.clone(),
            session_id: event.session_id.clone(),
            timestamp: event.timestamp,
            handled: false,
            severity: event.severity(),
        }
    }
}

/// Payload on `errors.retry`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub service: String,
    pub operation: String,
    #[serde(default)]
    pub payload: Value,
    pub original_error: String,
    pub error_kind: ErrorKind,
    pub retry_count: u32,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl RetryRequest {
    /// First retry request for a reported failure
    ///
    /// The operation name and payload come from the event context keys
    /// `operation` and `payload` when present.
    pub fn from_event(event: &ErrorEvent) -> Self {
        let operation = event
            .context
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Self {
            service: event.service.clone(),
            operation,
            payload: event.context.get("payload").cloned().unwrap_or(Value::Null),
            original_error: event.message.clone(),
            error_kind: event.error_kind,
            retry_count: 0,
            session_id: event.session_id.clone(),
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// Payload on `alerts.critical` / `alerts.normal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub service: String,
    pub level: Severity,
    pub error_kind: ErrorKind,
    pub message: String,
    pub session_id: Option<String>,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

/// Payload on `support.ticket.create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicketRequest {
    pub service: String,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    pub reason: String,
    pub session_id: Option<String>,
    pub context: ErrorContext,
    pub created_at: DateTime<Utc>,
}

/// Payload on `recovery.action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    pub service: String,
    pub action: String,
    pub session_id: Option<String>,
    pub context: ErrorContext,
    pub requested_at: DateTime<Utc>,
}

/// Payload on `alerts.high_error_rate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighErrorRateAlert {
    pub service: String,
    pub error_count: usize,
    pub threshold: usize,
    pub window_seconds: u64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceErrorSummary {
    pub total: usize,
    pub handled: usize,
    pub unhandled: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
}

/// Payload on `errors.summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub generated_at: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceErrorSummary>,
}

impl ErrorSummary {
    pub fn total(&self) -> usize {
        self.services.values().map(|s| s.total).sum()
    }
}
