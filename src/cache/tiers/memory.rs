//! Bounded in-process cache tier
//!
//! Expiry runs on the tokio monotonic clock so paused-time tests can drive it.
//! When a new key arrives at a full store, expired entries are dropped first,
//! then the oldest ~20% by insertion time. Check, evict and insert happen
//! under one lock acquisition.

use crate::cache::entry::CacheEntry;
use crate::cache::errors::CacheResult;
use crate::cache::traits::{CacheTier, TierKind};
use crate::constants::defaults::MEMORY_EVICTION_FRACTION;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct MemorySlot {
    entry: CacheEntry,
    inserted_at: Instant,
    deadline: Instant,
}

#[derive(Debug)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, MemorySlot>>,
    max_entries: usize,
    evictions: AtomicU64,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        debug!(max_entries, "Memory cache tier created");
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            evictions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entries removed to make room (expiry sweeps excluded)
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn make_room(&self, entries: &mut HashMap<String, MemorySlot>) {
        let now = Instant::now();
        entries.retain(|_, slot| slot.deadline > now);
        if entries.len() < self.max_entries {
            return;
        }

        let batch = ((self.max_entries as f64 * MEMORY_EVICTION_FRACTION).ceil() as usize).max(1);
        let mut by_age: Vec<(Instant, String)> = entries
            .iter()
            .map(|(key, slot)| (slot.inserted_at, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(inserted_at, _)| *inserted_at);

        for (_, key) in by_age.into_iter().take(batch) {
            entries.remove(&key);
        }

        self.evictions.fetch_add(batch as u64, Ordering::Relaxed);
        debug!(evicted = batch, remaining = entries.len(), "Memory tier evicted oldest entries");
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(slot) => slot.deadline <= Instant::now(),
        };

        if expired {
            entries.remove(key);
            debug!(key = key, "Memory tier entry expired");
            return Ok(None);
        }

        Ok(entries.get(key).map(|slot| slot.entry.clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        // An already-expired write still replaces the previous value
        let Some(ttl) = entry.remaining_ttl() else {
            self.entries.lock().remove(key);
            return Ok(());
        };
        if self.max_entries == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let slot = MemorySlot {
            entry,
            inserted_at: now,
            deadline: now + ttl,
        };

        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            self.make_room(&mut entries);
        }
        entries.insert(key.to_string(), slot);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, slot| slot.deadline > now);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn entry(value: serde_json::Value, ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(value, Duration::from_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_get_after_ttl_returns_none_and_evicts() {
        let tier = MemoryTier::new(10);
        tier.set("k", entry(json!({"a": 1}), 10)).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap().unwrap().value, json!({"a": 1}));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(tier.get("k").await.unwrap().is_none());
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_repeated_reads_are_identical() {
        let tier = MemoryTier::new(10);
        tier.set("k", entry(json!([1, 2, 3]), 60)).await.unwrap();

        let first = tier.get("k").await.unwrap().unwrap();
        let second = tier.get("k").await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_overflow_evicts_oldest_fifth() {
        let tier = MemoryTier::new(10);
        for i in 0..10 {
            tier.set(&format!("k{i}"), entry(json!(i), 60)).await.unwrap();
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        assert_eq!(tier.len(), 10);

        tier.set("k10", entry(json!(10), 60)).await.unwrap();

        // 2 oldest removed, 1 inserted
        assert_eq!(tier.len(), 9);
        assert_eq!(tier.evictions(), 2);
        assert!(tier.get("k0").await.unwrap().is_none());
        assert!(tier.get("k1").await.unwrap().is_none());
        assert!(tier.get("k2").await.unwrap().is_some());
        assert!(tier.get("k10").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_overflow_prefers_expired_entries() {
        let tier = MemoryTier::new(3);
        tier.set("short", entry(json!(1), 1)).await.unwrap();
        tier.set("long-a", entry(json!(2), 60)).await.unwrap();
        tier.set("long-b", entry(json!(3), 60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        tier.set("new", entry(json!(4), 60)).await.unwrap();

        assert_eq!(tier.evictions(), 0);
        assert!(tier.get("long-a").await.unwrap().is_some());
        assert!(tier.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_replacing_existing_key_does_not_evict() {
        let tier = MemoryTier::new(2);
        tier.set("a", entry(json!(1), 60)).await.unwrap();
        tier.set("b", entry(json!(2), 60)).await.unwrap();
        tier.set("a", entry(json!(3), 60)).await.unwrap();

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.evictions(), 0);
        assert_eq!(tier.get("a").await.unwrap().unwrap().value, json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_purge_expired() {
        let tier = MemoryTier::new(10);
        tier.set("a", entry(json!(1), 1)).await.unwrap();
        tier.set("b", entry(json!(2), 60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tier.purge_expired().await.unwrap(), 1);
        assert_eq!(tier.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_expired_write_replaces_previous_value() {
        let tier = MemoryTier::new(10);
        tier.set("k", entry(json!("v1"), 60)).await.unwrap();
        tier.set("k", CacheEntry::new(json!("v2"), Duration::ZERO))
            .await
            .unwrap();

        assert!(tier.get("k").await.unwrap().is_none());
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_invalidate() {
        let tier = MemoryTier::new(10);
        tier.set("a", entry(json!(1), 60)).await.unwrap();
        tier.invalidate("a").await.unwrap();
        assert!(tier.get("a").await.unwrap().is_none());
    }
}
