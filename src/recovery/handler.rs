//! # Error Handler
//!
//! Entry point for unrecovered failures: records the event in the ledger,
//! classifies it, applies inbound overrides and dispatches the strategy.

use super::classifier::ErrorClassifier;
use super::coordinator::RecoveryCoordinator;
use super::ledger::ErrorLedger;
use super::types::{
    AlertNotification, ErrorEvent, ErrorRecord, RetryRequest, Severity, Strategy, StrategyAction,
    SupportTicketRequest,
};
use crate::config::ErrorHandlingConfig;
use crate::constants::{defaults, topics};
use crate::error::Result;
use crate::events::{EventPublisher, PublishedEvent};
use crate::logging;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of handling one failure report
#[derive(Debug, Clone, PartialEq)]
pub struct HandledError {
    pub record_id: Uuid,
    pub strategy: Strategy,
}

#[derive(Debug)]
pub struct ErrorHandler {
    classifier: Arc<dyn ErrorClassifier>,
    coordinator: Arc<RecoveryCoordinator>,
    ledger: Arc<ErrorLedger>,
    publisher: EventPublisher,
    config: ErrorHandlingConfig,
}

impl ErrorHandler {
    pub fn new(
        classifier: Arc<dyn ErrorClassifier>,
        coordinator: Arc<RecoveryCoordinator>,
        ledger: Arc<ErrorLedger>,
        publisher: EventPublisher,
        config: ErrorHandlingConfig,
    ) -> Self {
        Self {
            classifier,
            coordinator,
            ledger,
            publisher,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<ErrorLedger> {
        &self.ledger
    }

    pub fn coordinator(&self) -> &Arc<RecoveryCoordinator> {
        &self.coordinator
    }

    pub async fn handle_error(&self, event: ErrorEvent) -> Result<HandledError> {
        let record_id = self.ledger.record_error(ErrorRecord::from_event(&event));

        let classified = self.classifier.classify(&event).await;
        let strategy = apply_overrides(classified, &event);

        debug!(
            service = %event.service,
            kind = %event.error_kind,
            action = %strategy.action,
            "Error classified"
        );

        self.apply_strategy(&strategy, &event).await?;

        if strategy.action != StrategyAction::Log {
            self.ledger.mark_handled(&event.service, record_id);
        }

        Ok(HandledError {
            record_id,
            strategy,
        })
    }

    pub async fn apply_strategy(&self, strategy: &Strategy, event: &ErrorEvent) -> Result<()> {
        match strategy.action {
            StrategyAction::Retry => {
                let request = RetryRequest::from_event(event);
                info!(
                    service = %event.service,
                    operation = %request.operation,
                    category = ?strategy.retry_category,
                    "🔄 Dispatching retry request"
                );
                self.publisher
                    .publish_serialized(topics::RETRY_DISPATCH, &request)
                    .await?;
            }
            StrategyAction::Alert => {
                self.send_alert(strategy.alert_level, event).await?;
                if strategy.escalate {
                    self.create_support_ticket(event, "escalated_alert").await?;
                }
                if let Some(action) = &strategy.recovery_action {
                    self.coordinator
                        .execute_recovery(
                            &event.service,
                            action,
                            event.session_id.as_deref(),
                            event.context.clone(),
                        )
                        .await;
                }
            }
            StrategyAction::Escalate => {
                self.create_support_ticket(event, "escalated").await?;
            }
            StrategyAction::Recover => {
                let action = strategy
                    .recovery_action
                    .as_deref()
                    .or_else(|| {
                        self.config
                            .recovery_action_for(&event.service, event.error_kind)
                    })
                    .unwrap_or(defaults::GENERIC_RECOVERY_ACTION);

                self.coordinator
                    .execute_recovery(
                        &event.service,
                        action,
                        event.session_id.as_deref(),
                        event.context.clone(),
                    )
                    .await;
            }
            StrategyAction::Log => {
                warn!(
                    service = %event.service,
                    kind = %event.error_kind,
                    message = %event.message,
                    session_id = ?event.session_id,
                    "Unclassified error recorded"
                );
            }
        }

        Ok(())
    }

    async fn send_alert(&self, level: Severity, event: &ErrorEvent) -> Result<()> {
        let topic = if level >= Severity::High {
            topics::ALERT_CRITICAL
        } else {
            topics::ALERT_NORMAL
        };

        let alert = AlertNotification {
            service: event.service.clone(),
            level,
            error_kind: event.error_kind,
            message: event.message.clone(),
            session_id: event.session_id.clone(),
            context: event.context.clone(),
            timestamp: Utc::now(),
        };

        if level >= Severity::High {
            error!(service = %event.service, level = %level, message = %event.message, "🚨 Sending alert");
        } else {
            warn!(service = %event.service, level = %level, message = %event.message, "Sending alert");
        }

        self.publisher.publish_serialized(topic, &alert).await?;
        Ok(())
    }

    async fn create_support_ticket(&self, event: &ErrorEvent, reason: &str) -> Result<()> {
        let ticket = SupportTicketRequest {
            service: event.service.clone(),
            error_kind: Some(event.error_kind),
            message: event.message.clone(),
            reason: reason.to_string(),
            session_id: event.session_id.clone(),
            context: event.context.clone(),
            created_at: Utc::now(),
        };

        warn!(service = %event.service, reason = reason, "🎫 Requesting support ticket");
        self.publisher
            .publish_serialized(topics::SUPPORT_TICKET, &ticket)
            .await?;
        Ok(())
    }

    /// Handle every report published on `errors.reported`
    ///
    /// Reports arrive through a queued subscription, so none are dropped when
    /// handling falls behind; publishers wait for room instead. Abort the
    /// returned handle to stop listening.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let handler = Arc::clone(self);
        info!(topic = topics::ERROR_REPORTED, "👂 Error handler listening");

        self.publisher
            .subscribe_topic_queued(topics::ERROR_REPORTED, move |published: PublishedEvent| {
                let handler = Arc::clone(&handler);
                async move {
                    let event = match serde_json::from_value::<ErrorEvent>(published.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(event_id = %published.id, error = %e, "Discarding malformed error report");
                            return;
                        }
                    };

                    if let Err(e) = handler.handle_error(event).await {
                        logging::log_error(
                            "error_handler",
                            "handle_error",
                            &e.to_string(),
                            Some(&published.id.to_string()),
                        );
                    }
                }
            })
    }
}

/// Inbound flags outrank the classifier
fn apply_overrides(mut strategy: Strategy, event: &ErrorEvent) -> Strategy {
    if event.is_critical {
        strategy.action = StrategyAction::Alert;
        strategy.alert_level = strategy.alert_level.max(Severity::High);
        strategy.escalate = true;
    }

    if event.requires_human_intervention {
        strategy.escalate = true;
        if strategy.action != StrategyAction::Alert {
            strategy.action = StrategyAction::Escalate;
        }
    }

    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::ErrorKind;
    use crate::recovery::classifier::StandardErrorClassifier;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn handler(publisher: &EventPublisher) -> Arc<ErrorHandler> {
        let config = ErrorHandlingConfig::default();
        let coordinator = Arc::new(RecoveryCoordinator::new(
            publisher.clone(),
            RetryConfig::default(),
            config.clone(),
        ));
        Arc::new(ErrorHandler::new(
            Arc::new(StandardErrorClassifier::new(config.clone())),
            coordinator,
            Arc::new(ErrorLedger::new(config.log_capacity)),
            publisher.clone(),
            config,
        ))
    }

    fn topics_seen(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            seen.push(event.topic);
        }
        seen
    }

    #[tokio::test]
    async fn test_transient_error_publishes_retry() {
        let publisher = EventPublisher::new(32);
        let mut receiver = publisher.subscribe();
        let handler = handler(&publisher);

        let event = ErrorEvent::new("pricing", ErrorKind::Network, "connection reset")
            .with_context("operation", json!("fetch_prices"));
        let handled = handler.handle_error(event).await.unwrap();

        assert_eq!(handled.strategy.action, StrategyAction::Retry);
        assert_eq!(topics_seen(&mut receiver), vec![topics::RETRY_DISPATCH.to_string()]);

        let record = &handler.ledger().records("pricing")[0];
        assert!(record.handled);
    }

    #[tokio::test]
    async fn test_critical_error_alerts_and_opens_ticket() {
        let publisher = EventPublisher::new(32);
        let mut receiver = publisher.subscribe();
        let handler = handler(&publisher);

        let event = ErrorEvent::new("auth", ErrorKind::Authentication, "token rejected");
        handler.handle_error(event).await.unwrap();

        assert_eq!(
            topics_seen(&mut receiver),
            vec![
                topics::ALERT_CRITICAL.to_string(),
                topics::SUPPORT_TICKET.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_is_critical_flag_forces_high_alert() {
        let publisher = EventPublisher::new(32);
        let mut receiver = publisher.subscribe();
        let handler = handler(&publisher);

        let event = ErrorEvent::new("pricing", ErrorKind::Network, "reset").critical();
        let handled = handler.handle_error(event).await.unwrap();

        assert_eq!(handled.strategy.action, StrategyAction::Alert);
        assert_eq!(handled.strategy.alert_level, Severity::High);
        assert!(handled.strategy.escalate);
        assert!(topics_seen(&mut receiver).contains(&topics::ALERT_CRITICAL.to_string()));
    }

    #[tokio::test]
    async fn test_human_intervention_forces_escalation() {
        let publisher = EventPublisher::new(32);
        let mut receiver = publisher.subscribe();
        let handler = handler(&publisher);

        let event =
            ErrorEvent::new("materials", ErrorKind::Validation, "odd input").requiring_human();
        let handled = handler.handle_error(event).await.unwrap();

        assert_eq!(handled.strategy.action, StrategyAction::Escalate);
        assert_eq!(topics_seen(&mut receiver), vec![topics::SUPPORT_TICKET.to_string()]);
    }

    #[tokio::test]
    async fn test_unclassified_error_only_logged() {
        let publisher = EventPublisher::new(32);
        let mut receiver = publisher.subscribe();
        let handler = handler(&publisher);

        let event = ErrorEvent::new("materials", ErrorKind::Validation, "negative fence length");
        let handled = handler.handle_error(event).await.unwrap();

        assert_eq!(handled.strategy.action, StrategyAction::Log);
        assert!(topics_seen(&mut receiver).is_empty());
        assert!(!handler.ledger().records("materials")[0].handled);
    }

    #[tokio::test]
    async fn test_listen_handles_published_reports() {
        let publisher = EventPublisher::new(32);
        let handler = handler(&publisher);
        let listener = handler.listen();

        publisher
            .publish(
                topics::ERROR_REPORTED,
                json!({
                    "service": "ai_extraction",
                    "errorKind": "AI_MODEL",
                    "message": "model returned garbage",
                    "sessionId": "sess-7"
                }),
            )
            .await
            .unwrap();

        for _ in 0..50 {
            if handler.ledger().len("ai_extraction") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.ledger().len("ai_extraction"), 1);
        listener.abort();
    }
}
