//! # Error Ledger
//!
//! Per-service bounded FIFO of [`ErrorRecord`]s. Appending past the capacity
//! drops the oldest records first; records older than the retention period
//! are removed by [`ErrorLedger::cleanup_older_than`].

use super::types::{ErrorRecord, ErrorSummary, ServiceErrorSummary};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub struct ErrorLedger {
    logs: DashMap<String, VecDeque<ErrorRecord>>,
    capacity: usize,
}

impl ErrorLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append and trim under the service's shard lock
    pub fn record_error(&self, record: ErrorRecord) -> Uuid {
        let id = record.id;
        let mut log = self.logs.entry(record.service.clone()).or_default();
        log.push_back(record);

        let mut dropped = 0;
        while log.len() > self.capacity {
            log.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped = dropped, capacity = self.capacity, "Error log trimmed");
        }

        id
    }

    pub fn mark_handled(&self, service: &str, id: Uuid) -> bool {
        let Some(mut log) = self.logs.get_mut(service) else {
            return false;
        };

        match log.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.handled = true;
                true
            }
            None => false,
        }
    }

    pub fn records(&self, service: &str) -> Vec<ErrorRecord> {
        self.logs
            .get(service)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.logs.iter().map(|e| e.key().clone()).collect();
        services.sort();
        services
    }

    pub fn len(&self, service: &str) -> usize {
        self.logs.get(service).map(|log| log.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.logs.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Records for `service` at or after `since`
    pub fn count_since(&self, service: &str, since: DateTime<Utc>) -> usize {
        self.logs
            .get(service)
            .map(|log| log.iter().filter(|r| r.timestamp >= since).count())
            .unwrap_or(0)
    }

    /// Drop records older than `cutoff`; services left empty are removed
    pub fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for mut entry in self.logs.iter_mut() {
            let before = entry.len();
            entry.retain(|record| record.timestamp >= cutoff);
            removed += before - entry.len();
        }
        self.logs.retain(|_, log| !log.is_empty());
        removed
    }

    pub fn summary(&self) -> ErrorSummary {
        let services = self
            .logs
            .iter()
            .map(|entry| {
                let mut summary = ServiceErrorSummary::default();
                for record in entry.value() {
                    summary.total += 1;
                    if record.handled {
                        summary.handled += 1;
                    } else {
                        summary.unhandled += 1;
                    }
                    *summary.by_kind.entry(record.kind).or_insert(0) += 1;
                }
                (entry.key().clone(), summary)
            })
            .collect::<BTreeMap<_, _>>();

        ErrorSummary {
            generated_at: Utc::now(),
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recovery::types::ErrorEvent;
    use chrono::Duration;

    fn record(service: &str, kind: ErrorKind, age_seconds: i64) -> ErrorRecord {
        let mut event = ErrorEvent::new(service, kind, format!("{kind} failure"));
        event.timestamp = Utc::now() - Duration::seconds(age_seconds);
        ErrorRecord::from_event(&event)
    }

    #[test]
    fn test_capacity_drops_oldest_first() {
        let ledger = ErrorLedger::new(3);
        let first = ledger.record_error(record("quotes", ErrorKind::Network, 0));
        for _ in 0..3 {
            ledger.record_error(record("quotes", ErrorKind::Timeout, 0));
        }

        let records = ledger.records("quotes");
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.id != first));
    }

    #[test]
    fn test_count_since_and_cleanup() {
        let ledger = ErrorLedger::new(100);
        ledger.record_error(record("quotes", ErrorKind::Network, 10));
        ledger.record_error(record("quotes", ErrorKind::Network, 120));
        ledger.record_error(record("materials", ErrorKind::Database, 90_000));

        let window_start = Utc::now() - Duration::seconds(60);
        assert_eq!(ledger.count_since("quotes", window_start), 1);

        let removed = ledger.cleanup_older_than(Utc::now() - Duration::seconds(86_400));
        assert_eq!(removed, 1);
        assert_eq!(ledger.services(), vec!["quotes".to_string()]);
    }

    #[test]
    fn test_summary_splits_handled() {
        let ledger = ErrorLedger::new(100);
        let id = ledger.record_error(record("quotes", ErrorKind::Network, 0));
        ledger.record_error(record("quotes", ErrorKind::Database, 0));
        assert!(ledger.mark_handled("quotes", id));
        assert!(!ledger.mark_handled("quotes", Uuid::new_v4()));

        let summary = ledger.summary();
        let quotes = &summary.services["quotes"];
        assert_eq!(quotes.total, 2);
        assert_eq!(quotes.handled, 1);
        assert_eq!(quotes.unhandled, 1);
        assert_eq!(quotes.by_kind[&ErrorKind::Database], 1);
        assert_eq!(summary.total(), 2);
    }
}
