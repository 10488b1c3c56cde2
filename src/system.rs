//! # Reliability Core
//!
//! Wires the tiered cache, circuit breakers, retry policies and the error
//! recovery components into one handle with a start/shutdown lifecycle.
//!
//! Background work started by [`ReliabilityCore::start`]:
//! - error-rate checks, ledger cleanup and summaries
//! - the `errors.reported` listener
//! - the cache expiry sweep, when configured

use crate::cache::{DistributedTier, KeyValueStore, TierKind, TieredCache};
use crate::config::{ConfigManager, ReliabilityConfig};
use crate::error::{Result, RetryCategory};
use crate::events::EventPublisher;
use crate::logging;
use crate::recovery::{
    ClassificationAdvisor, ErrorEvent, ErrorHandler, ErrorLedger, ErrorRateMonitor,
    HandledError, RecoveryCoordinator, RecoveryDispatcher, StandardErrorClassifier,
};
use crate::resilience::{CircuitBreakerManager, RetryPolicy};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Breaker guarding the distributed cache store
pub const DISTRIBUTED_CACHE_COMPONENT: &str = "distributed_cache";

pub struct ReliabilityCore {
    config_manager: Arc<ConfigManager>,
    publisher: EventPublisher,
    cache: Arc<TieredCache>,
    circuit_breakers: CircuitBreakerManager,
    ledger: Arc<ErrorLedger>,
    coordinator: Arc<RecoveryCoordinator>,
    handler: Arc<ErrorHandler>,
    monitor: Arc<ErrorRateMonitor>,
    background: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl std::fmt::Debug for ReliabilityCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityCore")
            .field("environment", &self.config_manager.environment())
            .field("cache_tiers", &self.cache.configured_tiers())
            .field("circuit_breakers_enabled", &self.circuit_breakers.is_enabled())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Point-in-time status of the core
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub running: bool,
    pub environment: String,
    pub cache_tiers: Vec<TierKind>,
    pub circuit_breakers_enabled: bool,
    pub circuit_health_score: f64,
    pub recorded_errors: usize,
    pub recoveries_in_flight: usize,
    pub pending_retries: usize,
}

impl ReliabilityCore {
    pub fn builder() -> ReliabilityCoreBuilder {
        ReliabilityCoreBuilder::default()
    }

    pub fn config(&self) -> &ReliabilityConfig {
        self.config_manager.config()
    }

    pub fn environment(&self) -> &str {
        self.config_manager.environment()
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.circuit_breakers
    }

    pub fn ledger(&self) -> &Arc<ErrorLedger> {
        &self.ledger
    }

    pub fn coordinator(&self) -> &Arc<RecoveryCoordinator> {
        &self.coordinator
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    pub fn monitor(&self) -> &Arc<ErrorRateMonitor> {
        &self.monitor
    }

    /// Retry policy configured for `category`
    pub fn retry_policy(&self, category: RetryCategory) -> RetryPolicy {
        RetryPolicy::for_category(category, &self.config().retry)
    }

    /// Handle a failure in-process, bypassing the event channel
    pub async fn report_error(&self, event: ErrorEvent) -> Result<HandledError> {
        self.handler.handle_error(event).await
    }

    /// Start background work; calling it again while running is a no-op
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reliability core already running");
            return;
        }

        self.monitor.start();

        let mut background = self.background.lock();
        background.push(self.handler.listen());

        if let Some(period) = self.config().cache.sweep_interval() {
            let cache = Arc::clone(&self.cache);
            background.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval.tick().await;

                loop {
                    interval.tick().await;
                    let purged = cache.purge_expired().await;
                    if purged > 0 {
                        logging::log_cache_operation("purge_expired", None, purged, "completed");
                    }
                }
            }));
        }

        info!(
            environment = %self.environment(),
            cache_tiers = ?self.cache.configured_tiers(),
            background_tasks = background.len(),
            "🚀 Reliability core started"
        );
    }

    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.monitor.stop();

        let handles: Vec<_> = self.background.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
            // Cancellation is the expected result
            let _ = handle.await;
        }

        self.coordinator.shutdown();
        info!("🛑 Reliability core shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            running: self.is_running(),
            environment: self.environment().to_string(),
            cache_tiers: self.cache.configured_tiers(),
            circuit_breakers_enabled: self.circuit_breakers.is_enabled(),
            circuit_health_score: self.circuit_breakers.system_health_score(),
            recorded_errors: self.ledger.total(),
            recoveries_in_flight: self.coordinator.in_flight_count(),
            pending_retries: self.coordinator.pending_retries(),
        }
    }
}

impl Drop for ReliabilityCore {
    fn drop(&mut self) {
        self.monitor.stop();
        for handle in self.background.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Assembles a [`ReliabilityCore`]
///
/// Without a config manager the defaults are used with the detected
/// environment. The distributed cache tier needs a store, either injected
/// here or connected from `cache.distributed_endpoint` when the
/// `cache-redis` feature is enabled.
#[derive(Default)]
pub struct ReliabilityCoreBuilder {
    config_manager: Option<Arc<ConfigManager>>,
    advisor: Option<Arc<dyn ClassificationAdvisor>>,
    dispatcher: Option<Arc<dyn RecoveryDispatcher>>,
    distributed_store: Option<Arc<dyn KeyValueStore>>,
}

impl ReliabilityCoreBuilder {
    pub fn config_manager(mut self, config_manager: Arc<ConfigManager>) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn advisor(mut self, advisor: Arc<dyn ClassificationAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn RecoveryDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn distributed_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.distributed_store = Some(store);
        self
    }

    pub async fn build(self) -> Result<Arc<ReliabilityCore>> {
        let config_manager = match self.config_manager {
            Some(manager) => manager,
            None => ConfigManager::from_config(
                ReliabilityConfig::default(),
                &ConfigManager::detect_environment(),
            )?,
        };
        let config = config_manager.config().clone();

        let publisher = EventPublisher::new(config.events.channel_capacity);
        let circuit_breakers = CircuitBreakerManager::from_config(&config.circuit_breakers);

        let distributed_store = match self.distributed_store {
            Some(store) => Some(store),
            None => connect_distributed_store(&config).await,
        };
        let distributed = distributed_store.map(|store| {
            DistributedTier::new(store, config.cache.distributed_namespace.clone())
                .with_circuit_breaker(
                    circuit_breakers.get_circuit_breaker(DISTRIBUTED_CACHE_COMPONENT),
                )
        });
        let cache = Arc::new(TieredCache::from_config(&config.cache, distributed).await?);

        let mut classifier = StandardErrorClassifier::new(config.error_handling.clone());
        if let Some(advisor) = self.advisor {
            classifier = classifier.with_advisor(advisor);
        }

        let mut coordinator = RecoveryCoordinator::new(
            publisher.clone(),
            config.retry.clone(),
            config.error_handling.clone(),
        );
        if let Some(dispatcher) = self.dispatcher {
            coordinator = coordinator.with_dispatcher(dispatcher);
        }
        let coordinator = Arc::new(coordinator);

        let ledger = Arc::new(ErrorLedger::new(config.error_handling.log_capacity));
        let handler = Arc::new(ErrorHandler::new(
            Arc::new(classifier),
            Arc::clone(&coordinator),
            Arc::clone(&ledger),
            publisher.clone(),
            config.error_handling.clone(),
        ));
        let monitor = Arc::new(ErrorRateMonitor::new(
            Arc::clone(&ledger),
            publisher.clone(),
            config.error_handling.clone(),
        ));

        info!(
            environment = %config_manager.environment(),
            circuit_breakers_enabled = circuit_breakers.is_enabled(),
            "✅ Reliability core assembled"
        );

        Ok(Arc::new(ReliabilityCore {
            config_manager,
            publisher,
            cache,
            circuit_breakers,
            ledger,
            coordinator,
            handler,
            monitor,
            background: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }))
    }
}

#[cfg(feature = "cache-redis")]
async fn connect_distributed_store(config: &ReliabilityConfig) -> Option<Arc<dyn KeyValueStore>> {
    if !config.cache.distributed_enabled {
        return None;
    }
    let endpoint = config.cache.distributed_endpoint.as_deref()?;

    match crate::cache::RedisStore::connect(endpoint).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            // The cache degrades to the local tiers
            warn!(error = %e, "Distributed cache store unavailable");
            None
        }
    }
}

#[cfg(not(feature = "cache-redis"))]
async fn connect_distributed_store(config: &ReliabilityConfig) -> Option<Arc<dyn KeyValueStore>> {
    if config.cache.distributed_enabled {
        warn!("Distributed cache enabled but built without a store backend");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recovery::StrategyAction;
    use tempfile::TempDir;

    async fn core(dir: &TempDir) -> Arc<ReliabilityCore> {
        let mut config = ReliabilityConfig::default();
        config.cache.persistent_path = dir.path().join("cache");
        let manager = ConfigManager::from_config(config, "test").unwrap();
        ReliabilityCore::builder()
            .config_manager(manager)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_wires_default_tiers() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir).await;

        assert_eq!(core.environment(), "test");
        assert_eq!(
            core.cache().configured_tiers(),
            vec![TierKind::Memory, TierKind::Persistent]
        );
        assert!(!core.is_running());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir).await;

        core.start();
        assert!(core.is_running());
        assert!(core.monitor().is_running());

        core.shutdown().await;
        assert!(!core.is_running());
        assert!(!core.monitor().is_running());
    }

    #[tokio::test]
    async fn test_dropping_core_stops_background_work() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir).await;
        let monitor = Arc::clone(core.monitor());

        core.start();
        assert!(monitor.is_running());

        drop(core);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_report_error_records_and_classifies() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir).await;

        let handled = core
            .report_error(ErrorEvent::new("pricing", ErrorKind::Timeout, "upstream slow"))
            .await
            .unwrap();

        assert_eq!(handled.strategy.action, StrategyAction::Retry);
        assert_eq!(core.status().recorded_errors, 1);
    }

    #[tokio::test]
    async fn test_retry_policy_per_category() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir).await;

        assert_eq!(core.retry_policy(RetryCategory::AiModel).max_retries, 2);
        assert_eq!(core.retry_policy(RetryCategory::Processing).max_retries, 1);
    }
}
