//! # Error Classification
//!
//! Maps a reported failure to a [`Strategy`]. The standard classifier checks,
//! in order: transient indicators, critical indicators, an optional
//! [`ClassificationAdvisor`] (falling back to keyword heuristics when it is
//! unavailable), and finally defaults to logging.

use super::types::{ErrorEvent, Severity, Strategy, StrategyAction};
use crate::config::{ErrorHandlingConfig, HeuristicRule};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ErrorClassifier: Send + Sync + Debug {
    async fn classify(&self, event: &ErrorEvent) -> Strategy;
}

/// External (typically model-backed) classification source
#[async_trait]
pub trait ClassificationAdvisor: Send + Sync + Debug {
    async fn recommend(&self, event: &ErrorEvent) -> Result<Strategy>;

    fn name(&self) -> &str {
        "advisor"
    }
}

#[derive(Debug, Clone)]
pub struct StandardErrorClassifier {
    config: ErrorHandlingConfig,
    advisor: Option<Arc<dyn ClassificationAdvisor>>,
}

impl StandardErrorClassifier {
    pub fn new(config: ErrorHandlingConfig) -> Self {
        Self {
            config: normalized(config),
            advisor: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn ClassificationAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    fn matches_any(indicators: &[String], kind_name: &str, message: &str) -> bool {
        indicators
            .iter()
            .any(|indicator| kind_name.contains(indicator.as_str()) || message.contains(indicator.as_str()))
    }

    /// Keyword rules, first match wins
    fn heuristic(&self, event: &ErrorEvent, message: &str) -> Option<Strategy> {
        let rule = self
            .config
            .heuristic_rules
            .iter()
            .find(|rule| message.contains(rule.keyword.as_str()))?;

        debug!(
            service = %event.service,
            keyword = %rule.keyword,
            action = %rule.action,
            "Heuristic rule matched"
        );

        let strategy = match rule.action {
            StrategyAction::Retry => Strategy::retry(event.error_kind.retry_category()),
            StrategyAction::Escalate => Strategy::escalate(),
            StrategyAction::Alert => Strategy::alert(Severity::Medium, false),
            StrategyAction::Recover => Strategy::recover(
                self.recovery_action(event)
                    .unwrap_or(crate::constants::defaults::GENERIC_RECOVERY_ACTION)
                    .to_string(),
            ),
            StrategyAction::Log => Strategy::log(),
        };
        Some(strategy)
    }

    fn recovery_action(&self, event: &ErrorEvent) -> Option<&str> {
        self.config
            .recovery_action_for(&event.service, event.error_kind)
    }

    async fn consult_advisor(
        &self,
        advisor: &Arc<dyn ClassificationAdvisor>,
        event: &ErrorEvent,
        timeout: Duration,
    ) -> Option<Strategy> {
        match tokio::time::timeout(timeout, advisor.recommend(event)).await {
            Ok(Ok(strategy)) => {
                debug!(
                    service = %event.service,
                    advisor = advisor.name(),
                    action = %strategy.action,
                    "Adopting advisor recommendation"
                );
                Some(strategy)
            }
            Ok(Err(e)) => {
                warn!(advisor = advisor.name(), error = %e, "Classification advisor failed, using heuristics");
                None
            }
            Err(_) => {
                warn!(
                    advisor = advisor.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Classification advisor timed out, using heuristics"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ErrorClassifier for StandardErrorClassifier {
    async fn classify(&self, event: &ErrorEvent) -> Strategy {
        let kind = event.error_kind;
        let kind_name = kind.as_str();
        let message = event.message.to_lowercase();

        if kind.is_transient()
            || Self::matches_any(&self.config.transient_indicators, kind_name, &message)
        {
            return Strategy::retry(kind.retry_category());
        }

        if kind.is_critical()
            || Self::matches_any(&self.config.critical_indicators, kind_name, &message)
        {
            let action = self.recovery_action(event).map(str::to_string);
            return Strategy::alert(Severity::High, true).with_recovery_action(action);
        }

        if let Some(advisor) = &self.advisor {
            if let Some(strategy) = self
                .consult_advisor(advisor, event, self.config.advisor_timeout())
                .await
            {
                return strategy;
            }
        }

        if let Some(strategy) = self.heuristic(event, &message) {
            return strategy;
        }

        Strategy::log()
    }
}

/// Lowercase indicators and keywords once so matching stays case-insensitive
fn normalized(mut config: ErrorHandlingConfig) -> ErrorHandlingConfig {
    let lower = |items: &mut Vec<String>| {
        for item in items.iter_mut() {
            *item = item.to_lowercase();
        }
    };
    lower(&mut config.transient_indicators);
    lower(&mut config.critical_indicators);
    config.heuristic_rules = config
        .heuristic_rules
        .into_iter()
        .map(|rule| HeuristicRule::new(rule.keyword.to_lowercase(), rule.action))
        .collect();
    config
}
