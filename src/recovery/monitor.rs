//! # Error Rate Monitor
//!
//! Periodic background work over the [`ErrorLedger`]: per-service error-rate
//! checks, retention cleanup and summary publication. Each job runs on its
//! own interval loop until [`ErrorRateMonitor::stop`] is called.

use super::ledger::ErrorLedger;
use super::types::{ErrorSummary, HighErrorRateAlert};
use crate::config::ErrorHandlingConfig;
use crate::constants::topics;
use crate::events::EventPublisher;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct ErrorRateMonitor {
    ledger: Arc<ErrorLedger>,
    publisher: EventPublisher,
    config: ErrorHandlingConfig,
    is_running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stats: MonitorStats,
}

impl std::fmt::Debug for ErrorRateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRateMonitor")
            .field("rate_window", &self.config.rate_window())
            .field("is_running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MonitorStats {
    rate_checks: AtomicU64,
    alerts_raised: AtomicU64,
    records_cleaned: AtomicU64,
    summaries_published: AtomicU64,
}

/// Monitor counters snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorStatsSnapshot {
    pub rate_checks: u64,
    pub alerts_raised: u64,
    pub records_cleaned: u64,
    pub summaries_published: u64,
}

impl ErrorRateMonitor {
    pub fn new(
        ledger: Arc<ErrorLedger>,
        publisher: EventPublisher,
        config: ErrorHandlingConfig,
    ) -> Self {
        Self {
            ledger,
            publisher,
            config,
            is_running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            stats: MonitorStats::default(),
        }
    }

    /// Publish a high-error-rate alert for every service whose count in the
    /// trailing window is at or above its threshold
    pub async fn check_error_rates(&self) -> Vec<HighErrorRateAlert> {
        self.stats.rate_checks.fetch_add(1, Ordering::Relaxed);

        let window = self.config.rate_window();
        let window_start = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let mut alerts = Vec::new();
        for service in self.ledger.services() {
            let error_count = self.ledger.count_since(&service, window_start);
            let threshold = self.config.threshold_for(&service);
            if error_count < threshold {
                continue;
            }

            warn!(
                service = %service,
                error_count = error_count,
                threshold = threshold,
                window_seconds = window.as_secs(),
                "📈 High error rate detected"
            );

            let alert = HighErrorRateAlert {
                service,
                error_count,
                threshold,
                window_seconds: window.as_secs(),
                detected_at: Utc::now(),
            };

            if let Err(e) = self
                .publisher
                .publish_serialized(topics::HIGH_ERROR_RATE, &alert)
                .await
            {
                error!(service = %alert.service, error = %e, "Failed to publish error-rate alert");
            }
            alerts.push(alert);
        }

        self.stats
            .alerts_raised
            .fetch_add(alerts.len() as u64, Ordering::Relaxed);
        alerts
    }

    /// Drop ledger records older than the retention period
    pub fn cleanup_old_errors(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let removed = self.ledger.cleanup_older_than(Utc::now() - retention);

        if removed > 0 {
            info!(removed = removed, "🧹 Cleaned up old error records");
        }
        self.stats
            .records_cleaned
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub async fn generate_error_summary(&self) -> ErrorSummary {
        let summary = self.ledger.summary();

        debug!(
            services = summary.services.len(),
            total = summary.total(),
            "Publishing error summary"
        );

        match self
            .publisher
            .publish_serialized(topics::ERROR_SUMMARY, &summary)
            .await
        {
            Ok(()) => {
                self.stats.summaries_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(error = %e, "Failed to publish error summary"),
        }

        summary
    }

    /// Spawn the rate-check, cleanup and summary loops
    ///
    /// Calling `start` on a running monitor is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("ErrorRateMonitor already running");
            return;
        }

        info!(
            rate_check_interval = ?self.config.rate_check_interval(),
            cleanup_interval = ?self.config.cleanup_interval(),
            summary_interval = ?self.config.summary_interval(),
            "🚀 Starting ErrorRateMonitor"
        );

        let rate_check = self.spawn_loop(self.config.rate_check_interval(), |monitor| async move {
            monitor.check_error_rates().await;
        });
        let cleanup = self.spawn_loop(self.config.cleanup_interval(), |monitor| async move {
            monitor.cleanup_old_errors();
        });
        let summary = self.spawn_loop(self.config.summary_interval(), |monitor| async move {
            monitor.generate_error_summary().await;
        });

        self.handles.lock().extend([rate_check, cleanup, summary]);
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, period: Duration, job: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                // Loops never keep a dropped monitor alive
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                if !monitor.is_running() {
                    break;
                }
                job(monitor).await;
            }
        })
    }

    pub fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        info!("🛑 ErrorRateMonitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> MonitorStatsSnapshot {
        MonitorStatsSnapshot {
            rate_checks: self.stats.rate_checks.load(Ordering::Relaxed),
            alerts_raised: self.stats.alerts_raised.load(Ordering::Relaxed),
            records_cleaned: self.stats.records_cleaned.load(Ordering::Relaxed),
            summaries_published: self.stats.summaries_published.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ErrorRateMonitor {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recovery::types::{ErrorEvent, ErrorRecord};

    fn record(service: &str, age_seconds: i64) -> ErrorRecord {
        let mut event = ErrorEvent::new(service, ErrorKind::Network, "connection reset");
        event.timestamp = Utc::now() - chrono::Duration::seconds(age_seconds);
        ErrorRecord::from_event(&event)
    }

    fn monitor(config: ErrorHandlingConfig) -> (Arc<ErrorRateMonitor>, EventPublisher) {
        let publisher = EventPublisher::new(64);
        let ledger = Arc::new(ErrorLedger::new(config.log_capacity));
        (
            Arc::new(ErrorRateMonitor::new(ledger, publisher.clone(), config)),
            publisher,
        )
    }

    #[tokio::test]
    async fn test_rate_alert_at_threshold() {
        let mut config = ErrorHandlingConfig::default();
        config.error_rate_thresholds.insert("pricing".to_string(), 3);
        let (monitor, publisher) = monitor(config);
        let mut receiver = publisher.subscribe();

        for _ in 0..2 {
            monitor.ledger.record_error(record("pricing", 5));
        }
        // Outside the window, never counted
        monitor.ledger.record_error(record("pricing", 600));
        assert!(monitor.check_error_rates().await.is_empty());

        monitor.ledger.record_error(record("pricing", 5));

        let alerts = monitor.check_error_rates().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].error_count, 3);
        assert_eq!(alerts[0].threshold, 3);

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.topic, topics::HIGH_ERROR_RATE);
        assert_eq!(event.payload["errorCount"], 3);
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let (monitor, _publisher) = monitor(ErrorHandlingConfig::default());
        monitor.ledger.record_error(record("quotes", 10));
        monitor.ledger.record_error(record("quotes", 2 * 86_400));

        assert_eq!(monitor.cleanup_old_errors(), 1);
        assert_eq!(monitor.ledger.len("quotes"), 1);
        assert_eq!(monitor.stats().records_cleaned, 1);
    }

    #[tokio::test]
    async fn test_summary_is_published() {
        let (monitor, publisher) = monitor(ErrorHandlingConfig::default());
        let mut receiver = publisher.subscribe();
        monitor.ledger.record_error(record("quotes", 0));
        monitor.ledger.record_error(record("materials", 0));

        let summary = monitor.generate_error_summary().await;
        assert_eq!(summary.total(), 2);

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.topic, topics::ERROR_SUMMARY);
        assert_eq!(monitor.stats().summaries_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loops_run_until_stopped() {
        let config = ErrorHandlingConfig {
            rate_check_interval_seconds: 1,
            ..Default::default()
        };
        let (monitor, _publisher) = monitor(config);

        monitor.start();
        assert!(monitor.is_running());
        // Second start is ignored
        monitor.start();
        assert_eq!(monitor.handles.lock().len(), 3);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let checks = monitor.stats().rate_checks;
        assert!(checks >= 3, "expected at least 3 rate checks, saw {checks}");

        monitor.stop();
        assert!(!monitor.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.stats().rate_checks, checks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_loops_do_not_keep_monitor_alive() {
        let config = ErrorHandlingConfig {
            rate_check_interval_seconds: 1,
            ..Default::default()
        };
        let (monitor, _publisher) = monitor(config);
        monitor.start();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(monitor.stats().rate_checks >= 1);

        let weak = Arc::downgrade(&monitor);
        drop(monitor);
        assert!(weak.upgrade().is_none());
    }
}
