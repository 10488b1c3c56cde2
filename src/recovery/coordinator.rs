//! # Recovery Coordinator
//!
//! Runs recovery actions with exact-key deduplication and schedules deferred
//! retry re-dispatches.
//!
//! A recovery is keyed by `service:action:session`. While a key is in flight,
//! further requests for it return [`RecoveryOutcome::Duplicate`] without
//! dispatching. The in-flight marker is cleared when the attempt finishes,
//! including when its future is dropped.

use super::types::{ErrorContext, RecoveryRequest, RetryRequest, SupportTicketRequest};
use crate::config::{ErrorHandlingConfig, RetryConfig};
use crate::constants::{defaults, topics};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::logging;
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Carries out a recovery action
#[async_trait]
pub trait RecoveryDispatcher: Send + Sync + Debug {
    async fn dispatch(&self, request: &RecoveryRequest) -> Result<()>;
}

/// Publishes recovery requests on `recovery.action` for an external executor
#[derive(Debug, Clone)]
pub struct PublishingRecoveryDispatcher {
    publisher: EventPublisher,
}

impl PublishingRecoveryDispatcher {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl RecoveryDispatcher for PublishingRecoveryDispatcher {
    async fn dispatch(&self, request: &RecoveryRequest) -> Result<()> {
        self.publisher
            .publish_serialized(topics::RECOVERY_ACTION, request)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecoveryKey {
    pub service: String,
    pub action: String,
    pub session_id: String,
}

impl RecoveryKey {
    pub fn new(service: &str, action: &str, session_id: Option<&str>) -> Self {
        Self {
            service: service.to_string(),
            action: action.to_string(),
            session_id: session_id.unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.action, self.session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Completed,
    /// Same key already in flight; nothing was dispatched
    Duplicate,
    Failed { error: String, escalated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub key: String,
    pub outcome: RecoveryOutcome,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-dispatch scheduled after `delay`
    Scheduled { retry_count: u32, delay: Duration },
    /// Retry budget spent; recovery was attempted instead
    Exhausted {
        action: String,
        outcome: RecoveryOutcome,
    },
}

#[derive(Debug)]
pub struct RecoveryCoordinator {
    publisher: EventPublisher,
    dispatcher: Arc<dyn RecoveryDispatcher>,
    retry_config: RetryConfig,
    error_handling: ErrorHandlingConfig,
    in_flight: Mutex<HashSet<RecoveryKey>>,
    history: Mutex<VecDeque<RecoveryRecord>>,
    pending: Mutex<JoinSet<()>>,
}

impl RecoveryCoordinator {
    pub fn new(
        publisher: EventPublisher,
        retry_config: RetryConfig,
        error_handling: ErrorHandlingConfig,
    ) -> Self {
        let dispatcher = Arc::new(PublishingRecoveryDispatcher::new(publisher.clone()));
        Self {
            publisher,
            dispatcher,
            retry_config,
            error_handling,
            in_flight: Mutex::new(HashSet::new()),
            history: Mutex::new(VecDeque::new()),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn RecoveryDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Run `action` for `service`/`session_id` unless the same key is in flight
    pub async fn execute_recovery(
        &self,
        service: &str,
        action: &str,
        session_id: Option<&str>,
        context: ErrorContext,
    ) -> RecoveryOutcome {
        self.run_recovery(service, action, session_id, context, false)
            .await
    }

    /// A failure is escalated only when the recovery stands in for a spent
    /// retry budget
    async fn run_recovery(
        &self,
        service: &str,
        action: &str,
        session_id: Option<&str>,
        context: ErrorContext,
        after_exhausted_retries: bool,
    ) -> RecoveryOutcome {
        let key = RecoveryKey::new(service, action, session_id);

        if !self.in_flight.lock().insert(key.clone()) {
            debug!(recovery_key = %key, "Recovery already in flight, skipping duplicate");
            return RecoveryOutcome::Duplicate;
        }
        let _marker = InFlightMarker {
            in_flight: &self.in_flight,
            key: key.clone(),
        };

        info!(recovery_key = %key, "🔧 Executing recovery action");

        let request = RecoveryRequest {
            service: service.to_string(),
            action: action.to_string(),
            session_id: session_id.map(str::to_string),
            context: context.clone(),
            requested_at: Utc::now(),
        };

        let outcome = match self.dispatcher.dispatch(&request).await {
            Ok(()) => {
                logging::log_recovery_operation(service, action, session_id, "completed", None);
                RecoveryOutcome::Completed
            }
            Err(e) => {
                let message = e.to_string();
                logging::log_recovery_operation(service, action, session_id, "failed", Some(&message));
                let escalated = if after_exhausted_retries {
                    self.escalate_failed_recovery(&request, &message).await
                } else {
                    false
                };
                RecoveryOutcome::Failed {
                    error: message,
                    escalated,
                }
            }
        };

        self.remember(&key, &outcome);
        outcome
    }

    async fn escalate_failed_recovery(&self, request: &RecoveryRequest, error: &str) -> bool {
        let ticket = SupportTicketRequest {
            service: request.service.clone(),
            error_kind: None,
            message: format!("Recovery action '{}' failed: {error}", request.action),
            reason: "recovery_failed_after_retries".to_string(),
            session_id: request.session_id.clone(),
            context: request.context.clone(),
            created_at: Utc::now(),
        };

        match self
            .publisher
            .publish_serialized(topics::SUPPORT_TICKET, &ticket)
            .await
        {
            Ok(()) => {
                warn!(service = %request.service, action = %request.action, "🎫 Escalated failed recovery");
                true
            }
            Err(e) => {
                error!(service = %request.service, error = %e, "Failed to escalate recovery failure");
                false
            }
        }
    }

    fn remember(&self, key: &RecoveryKey, outcome: &RecoveryOutcome) {
        let mut history = self.history.lock();
        history.push_back(RecoveryRecord {
            key: key.to_string(),
            outcome: outcome.clone(),
            finished_at: Utc::now(),
        });
        while history.len() > defaults::RECOVERY_HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    /// Schedule the next retry, or hand over to recovery once the budget for
    /// the error's retry category is spent
    pub async fn retry_operation(&self, request: RetryRequest) -> RetryDecision {
        let category = request.error_kind.retry_category();
        let policy = RetryPolicy::for_category(category, &self.retry_config);

        if request.retry_count >= policy.max_retries {
            let session_id = request.session_id.as_deref();

            let action = self
                .error_handling
                .recovery_action_for(&request.service, request.error_kind)
                .unwrap_or(defaults::RETRIES_EXHAUSTED_ACTION)
                .to_string();

            warn!(
                service = %request.service,
                operation = %request.operation,
                retry_count = request.retry_count,
                category = %category,
                action = %action,
                "Retries exhausted, invoking recovery"
            );

            let context = ErrorContext::from([
                ("operation".to_string(), json!(request.operation)),
                ("originalError".to_string(), json!(request.original_error)),
                ("retryCount".to_string(), json!(request.retry_count)),
                ("payload".to_string(), request.payload.clone()),
            ]);

            let outcome = self
                .run_recovery(&request.service, &action, session_id, context, true)
                .await;
            return RetryDecision::Exhausted { action, outcome };
        }

        let delay = policy.jittered_delay(request.retry_count);
        let next = request.next_attempt();
        let retry_count = next.retry_count;

        debug!(
            service = %next.service,
            operation = %next.operation,
            retry_count = retry_count,
            delay_ms = delay.as_millis() as u64,
            "Scheduling deferred retry"
        );

        let publisher = self.publisher.clone();
        let mut pending = self.pending.lock();
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = publisher
                .publish_serialized(topics::RETRY_DISPATCH, &next)
                .await
            {
                error!(service = %next.service, error = %e, "Failed to publish deferred retry");
            }
        });

        RetryDecision::Scheduled { retry_count, delay }
    }

    pub fn is_in_flight(&self, service: &str, action: &str, session_id: Option<&str>) -> bool {
        self.in_flight
            .lock()
            .contains(&RecoveryKey::new(service, action, session_id))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Most recent finished recoveries, oldest first
    pub fn completed(&self) -> Vec<RecoveryRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn pending_retries(&self) -> usize {
        let mut pending = self.pending.lock();
        while pending.try_join_next().is_some() {}
        pending.len()
    }

    /// Abort every deferred retry that has not fired yet
    pub fn shutdown(&self) {
        let mut pending = self.pending.lock();
        let outstanding = pending.len();
        pending.abort_all();
        // Aborted tasks never publish; stop tracking them
        pending.detach_all();
        if outstanding > 0 {
            info!(outstanding = outstanding, "Aborted pending retry dispatches");
        }
    }
}

struct InFlightMarker<'a> {
    in_flight: &'a Mutex<HashSet<RecoveryKey>>,
    key: RecoveryKey,
}

impl Drop for InFlightMarker<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ReliabilityError};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct SlowDispatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecoveryDispatcher for SlowDispatcher {
        async fn dispatch(&self, _request: &RecoveryRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenDispatcher;

    #[async_trait]
    impl RecoveryDispatcher for BrokenDispatcher {
        async fn dispatch(&self, _request: &RecoveryRequest) -> Result<()> {
            Err(ReliabilityError::operation(ErrorKind::ExternalApi, "executor unreachable"))
        }
    }

    fn coordinator(publisher: &EventPublisher) -> RecoveryCoordinator {
        RecoveryCoordinator::new(
            publisher.clone(),
            RetryConfig::default(),
            ErrorHandlingConfig::default(),
        )
    }

    fn request(kind: ErrorKind, retry_count: u32) -> RetryRequest {
        RetryRequest {
            service: "pricing".to_string(),
            operation: "fetch_prices".to_string(),
            payload: Value::Null,
            original_error: "connection reset".to_string(),
            error_kind: kind,
            retry_count,
            session_id: Some("s1".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_duplicates_dispatch_once() {
        let dispatcher = Arc::new(SlowDispatcher::default());
        let coordinator =
            coordinator(&EventPublisher::new(16)).with_dispatcher(dispatcher.clone());

        let (first, second) = tokio::join!(
            coordinator.execute_recovery("quotes", "reload_rates", Some("s1"), ErrorContext::new()),
            coordinator.execute_recovery("quotes", "reload_rates", Some("s1"), ErrorContext::new()),
        );

        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|o| matches!(o, RecoveryOutcome::Duplicate));
        assert_eq!(outcomes, vec![RecoveryOutcome::Completed, RecoveryOutcome::Duplicate]);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight_count(), 0);

        // Marker cleared: the same key can run again
        let again = coordinator
            .execute_recovery("quotes", "reload_rates", Some("s1"), ErrorContext::new())
            .await;
        assert_eq!(again, RecoveryOutcome::Completed);
        assert_eq!(coordinator.completed().len(), 2);
    }

    #[tokio::test]
    async fn test_default_dispatcher_publishes_recovery_action() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        let coordinator = coordinator(&publisher);

        let outcome = coordinator
            .execute_recovery("quotes", "reload_rates", None, ErrorContext::new())
            .await;
        assert_eq!(outcome, RecoveryOutcome::Completed);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.topic, topics::RECOVERY_ACTION);
        assert_eq!(event.payload["action"], "reload_rates");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_scheduled_then_published() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        let coordinator = coordinator(&publisher);

        let decision = coordinator.retry_operation(request(ErrorKind::Network, 0)).await;
        let RetryDecision::Scheduled { retry_count, delay } = decision else {
            panic!("expected a scheduled retry");
        };
        assert_eq!(retry_count, 1);
        assert!(delay <= Duration::from_millis(1500));
        assert_eq!(coordinator.pending_retries(), 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.topic, topics::RETRY_DISPATCH);
        assert_eq!(event.payload["retryCount"], 1);
        assert_eq!(event.payload["operation"], "fetch_prices");
    }

    #[tokio::test]
    async fn test_exhausted_retry_invokes_recovery() {
        let publisher = EventPublisher::new(16);
        let coordinator = coordinator(&publisher);
        let max = RetryConfig::default().external_api.max_retries;

        let decision = coordinator
            .retry_operation(request(ErrorKind::Network, max))
            .await;
        assert_eq!(
            decision,
            RetryDecision::Exhausted {
                action: defaults::RETRIES_EXHAUSTED_ACTION.to_string(),
                outcome: RecoveryOutcome::Completed,
            }
        );
        assert_eq!(coordinator.pending_retries(), 0);
    }

    #[tokio::test]
    async fn test_failed_recovery_after_exhaustion_escalates() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        let coordinator = coordinator(&publisher).with_dispatcher(Arc::new(BrokenDispatcher));
        let max = RetryConfig::default().external_api.max_retries;

        let decision = coordinator
            .retry_operation(request(ErrorKind::Network, max))
            .await;
        match decision {
            RetryDecision::Exhausted {
                outcome: RecoveryOutcome::Failed { escalated, .. },
                ..
            } => assert!(escalated),
            other => panic!("unexpected decision: {other:?}"),
        }

        let ticket = receiver.recv().await.unwrap();
        assert_eq!(ticket.topic, topics::SUPPORT_TICKET);
    }

    #[tokio::test]
    async fn test_exhaustion_does_not_leak_into_later_recoveries() {
        let publisher = EventPublisher::new(2048);
        let mut receiver = publisher.subscribe();
        let coordinator = coordinator(&publisher).with_dispatcher(Arc::new(BrokenDispatcher));
        let max = RetryConfig::default().external_api.max_retries;

        for i in 0..200 {
            let mut exhausted = request(ErrorKind::Network, max);
            exhausted.session_id = Some(format!("session-{i}"));
            coordinator.retry_operation(exhausted).await;
        }
        assert_eq!(coordinator.in_flight_count(), 0);
        while receiver.try_recv().is_ok() {}

        // Same service and session as an earlier exhausted retry
        let later = coordinator
            .execute_recovery("pricing", "reload_rates", Some("session-7"), ErrorContext::new())
            .await;
        assert!(matches!(
            later,
            RecoveryOutcome::Failed { escalated: false, .. }
        ));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_recovery_without_exhaustion_does_not_escalate() {
        let coordinator =
            coordinator(&EventPublisher::new(16)).with_dispatcher(Arc::new(BrokenDispatcher));
        let outcome = coordinator
            .execute_recovery("quotes", "reload_rates", None, ErrorContext::new())
            .await;
        assert!(matches!(
            outcome,
            RecoveryOutcome::Failed { escalated: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_pending_retries() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        let coordinator = coordinator(&publisher);

        coordinator.retry_operation(request(ErrorKind::Network, 0)).await;
        coordinator.shutdown();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(receiver.try_recv().is_err());
        assert_eq!(coordinator.pending_retries(), 0);
    }
}
