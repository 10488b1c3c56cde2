//! # Tiered Cache Engine
//!
//! Orchestrates ordered reads across tiers, fan-out writes and invalidations,
//! key normalization and hit/miss statistics.
//!
//! ## Read cascade
//!
//! Tiers are consulted in the order the caller gives; the first hit wins and
//! later tiers are not touched. A tier read failure counts as a miss for that
//! tier and the cascade continues.
//!
//! ## Backfill
//!
//! Any hit served by a tier other than memory is copied into the memory tier
//! (when one is configured) with the entry's remaining lifetime, capped at the
//! memory tier's default TTL. Persistent and distributed hits follow the same
//! rule.
//!
//! ## Writes
//!
//! `set` and `invalidate` fan out to every requested tier concurrently. A tier
//! failure is logged and counted and never aborts the other tiers.
//!
//! `warm` is cache-or-compute without cross-call coordination: concurrent
//! callers that miss on the same key each run their getter.

use super::entry::CacheEntry;
use super::errors::CacheError;
use super::keys::normalize_key;
use super::stats::{CacheStats, StatsCollector};
use super::tiers::{DistributedTier, MemoryTier, PersistentTier};
use super::traits::{CacheTier, TierKind};
use crate::config::CacheConfig;
use crate::error::Result;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default read order when the caller does not name tiers
pub const DEFAULT_READ_TIERS: [TierKind; 2] = [TierKind::Memory, TierKind::Persistent];

#[derive(Debug, Clone)]
struct TierSlot {
    tier: Arc<dyn CacheTier>,
    default_ttl: Duration,
}

/// Multi-tier cache facade shared by every caller
#[derive(Debug)]
pub struct TieredCache {
    tiers: BTreeMap<TierKind, TierSlot>,
    stats: StatsCollector,
}

impl TieredCache {
    pub fn builder() -> TieredCacheBuilder {
        TieredCacheBuilder::default()
    }

    /// Build the tiers described by configuration
    ///
    /// The distributed tier is supplied by the caller because connecting to
    /// its store is the caller's concern; it is ignored unless enabled.
    pub async fn from_config(
        config: &CacheConfig,
        distributed: Option<DistributedTier>,
    ) -> Result<Self> {
        let mut builder = Self::builder();

        if config.memory_max_entries > 0 {
            builder = builder.memory(config.memory_max_entries, config.memory_ttl());
        }

        if config.persistent_enabled {
            let persistent = PersistentTier::open(&config.persistent_path).await?;
            builder = builder.tier(Arc::new(persistent), config.persistent_ttl());
        }

        match (config.distributed_enabled, distributed) {
            (true, Some(tier)) => {
                builder = builder.tier(Arc::new(tier), config.distributed_ttl());
            }
            (true, None) => {
                warn!("Distributed cache enabled but no store available, continuing without it");
            }
            (false, _) => {}
        }

        let cache = builder.build();
        info!(tiers = ?cache.configured_tiers(), "🗄️ Tiered cache initialized");
        Ok(cache)
    }

    pub fn configured_tiers(&self) -> Vec<TierKind> {
        self.tiers.keys().copied().collect()
    }

    pub fn has_tier(&self, kind: TierKind) -> bool {
        self.tiers.contains_key(&kind)
    }

    /// Raw value lookup across `tiers` in order
    pub async fn get(&self, key: &str, tiers: &[TierKind]) -> Option<Value> {
        let normalized = normalize_key(key);

        for kind in tiers {
            let Some(slot) = self.tiers.get(kind) else {
                continue;
            };

            match slot.tier.get(&normalized).await {
                Ok(Some(entry)) => {
                    self.stats.record_tier_hit(*kind);
                    self.stats.record_hit();
                    debug!(key = key, tier = %kind, "Cache HIT");

                    if *kind != TierKind::Memory {
                        self.backfill_memory(&normalized, &entry).await;
                    }
                    return Some(entry.value);
                }
                Ok(None) => {
                    self.stats.record_tier_miss(*kind);
                }
                Err(e) => {
                    warn!(key = key, tier = %kind, error = %e, "Cache tier read failed, treating as miss");
                    self.stats.record_tier_error(*kind);
                    self.stats.record_tier_miss(*kind);
                }
            }
        }

        self.stats.record_miss();
        debug!(key = key, "Cache MISS");
        None
    }

    /// Typed lookup; a stored value that does not fit `T` is an error
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        key: &str,
        tiers: &[TierKind],
    ) -> Result<Option<T>> {
        match self.get(key, tiers).await {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::from(e).into()),
            None => Ok(None),
        }
    }

    /// Serialize `value` and write it to every requested tier
    ///
    /// `ttl = None` uses each tier's default. Returns the number of tiers
    /// written successfully.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tiers: &[TierKind],
    ) -> Result<usize> {
        let value = serde_json::to_value(value).map_err(CacheError::from)?;
        Ok(self.set_value(key, value, ttl, tiers).await)
    }

    pub async fn set_value(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        tiers: &[TierKind],
    ) -> usize {
        let normalized = normalize_key(key);

        let writes = self.requested_slots(tiers).map(|(kind, slot)| {
            let entry = CacheEntry::new(value.clone(), ttl.unwrap_or(slot.default_ttl));
            let normalized = normalized.as_str();
            async move { (kind, slot.tier.set(normalized, entry).await) }
        });

        let mut written = 0;
        for (kind, outcome) in join_all(writes).await {
            match outcome {
                Ok(()) => {
                    written += 1;
                    self.stats.record_write(true);
                }
                Err(e) => {
                    warn!(key = key, tier = %kind, error = %e, "Cache tier write failed");
                    self.stats.record_write(false);
                }
            }
        }

        debug!(key = key, tiers_written = written, "Cache SET");
        written
    }

    /// Remove `key` from every requested tier, returning how many succeeded
    pub async fn invalidate(&self, key: &str, tiers: &[TierKind]) -> usize {
        let normalized = normalize_key(key);

        let removals = self.requested_slots(tiers).map(|(kind, slot)| {
            let normalized = normalized.as_str();
            async move { (kind, slot.tier.invalidate(normalized).await) }
        });

        let mut removed = 0;
        for (kind, outcome) in join_all(removals).await {
            match outcome {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(key = key, tier = %kind, error = %e, "Cache tier invalidation failed");
                }
            }
        }

        self.stats.record_invalidation();
        debug!(key = key, tiers_invalidated = removed, "Cache DEL");
        removed
    }

    /// Invalidate across every configured tier
    pub async fn invalidate_everywhere(&self, key: &str) -> usize {
        let tiers = self.configured_tiers();
        self.invalidate(key, &tiers).await
    }

    /// Cache-or-compute
    ///
    /// On a miss `getter` runs once for this call and its result is stored in
    /// `tiers`. A stored value that no longer deserializes into `T` is treated
    /// as a miss and overwritten.
    pub async fn warm<T, F, Fut>(
        &self,
        key: &str,
        getter: F,
        ttl: Option<Duration>,
        tiers: &[TierKind],
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key, tiers).await {
            match serde_json::from_value::<T>(value) {
                Ok(cached) => return Ok(cached),
                Err(e) => {
                    warn!(key = key, error = %e, "Cached value has unexpected shape, recomputing");
                }
            }
        }

        let computed = getter().await?;
        self.set(key, &computed, ttl, tiers).await?;
        Ok(computed)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Sweep expired entries from every tier
    pub async fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for (kind, slot) in &self.tiers {
            match slot.tier.purge_expired().await {
                Ok(count) => purged += count,
                Err(e) => warn!(tier = %kind, error = %e, "Cache tier purge failed"),
            }
        }
        purged
    }

    pub async fn health_check(&self) -> BTreeMap<TierKind, bool> {
        let mut health = BTreeMap::new();
        for (kind, slot) in &self.tiers {
            let healthy = slot.tier.health_check().await.unwrap_or(false);
            health.insert(*kind, healthy);
        }
        health
    }

    fn requested_slots<'a>(
        &'a self,
        tiers: &'a [TierKind],
    ) -> impl Iterator<Item = (TierKind, &'a TierSlot)> + 'a {
        let mut seen = Vec::with_capacity(tiers.len());
        tiers.iter().filter_map(move |kind| {
            if seen.contains(kind) {
                return None;
            }
            seen.push(*kind);
            self.tiers.get(kind).map(|slot| (*kind, slot))
        })
    }

    async fn backfill_memory(&self, normalized: &str, entry: &CacheEntry) {
        let Some(memory) = self.tiers.get(&TierKind::Memory) else {
            return;
        };
        let Some(remaining) = entry.remaining_ttl() else {
            return;
        };

        let ttl = remaining.min(memory.default_ttl);
        let copy = CacheEntry::new(entry.value.clone(), ttl);
        match memory.tier.set(normalized, copy).await {
            Ok(()) => self.stats.record_backfill(),
            Err(e) => warn!(key = normalized, error = %e, "Memory backfill failed"),
        }
    }
}

/// Builder for [`TieredCache`]; one tier per [`TierKind`]
#[derive(Debug, Default)]
pub struct TieredCacheBuilder {
    tiers: BTreeMap<TierKind, TierSlot>,
}

impl TieredCacheBuilder {
    pub fn memory(self, max_entries: usize, default_ttl: Duration) -> Self {
        self.tier(Arc::new(MemoryTier::new(max_entries)), default_ttl)
    }

    /// Add or replace the tier of `tier.kind()`
    pub fn tier(mut self, tier: Arc<dyn CacheTier>, default_ttl: Duration) -> Self {
        self.tiers.insert(tier.kind(), TierSlot { tier, default_ttl });
        self
    }

    pub fn build(self) -> TieredCache {
        TieredCache {
            tiers: self.tiers,
            stats: StatsCollector::default(),
        }
    }
}
