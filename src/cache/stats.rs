//! Hit/miss accounting for the tiered cache

use super::traits::TierKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Lock-free counters shared by concurrent cache callers
#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    memory: TierCounters,
    persistent: TierCounters,
    distributed: TierCounters,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    invalidations: AtomicU64,
    backfills: AtomicU64,
}

impl StatsCollector {
    fn tier(&self, tier: TierKind) -> &TierCounters {
        match tier {
            TierKind::Memory => &self.memory,
            TierKind::Persistent => &self.persistent,
            TierKind::Distributed => &self.distributed,
        }
    }

    pub fn record_tier_hit(&self, tier: TierKind) {
        self.tier(tier).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier_miss(&self, tier: TierKind) {
        self.tier(tier).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier_error(&self, tier: TierKind) {
        self.tier(tier).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, succeeded: bool) {
        if succeeded {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill(&self) {
        self.backfills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let tiers = TierKind::ALL
            .iter()
            .map(|kind| {
                let counters = self.tier(*kind);
                (
                    *kind,
                    TierStats::new(
                        counters.hits.load(Ordering::Relaxed),
                        counters.misses.load(Ordering::Relaxed),
                        counters.errors.load(Ordering::Relaxed),
                    ),
                )
            })
            .collect();

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            tiers,
            hits,
            misses,
            hit_rate: ratio(hits, misses),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            backfills: self.backfills.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for kind in TierKind::ALL {
            let counters = self.tier(kind);
            counters.hits.store(0, Ordering::Relaxed);
            counters.misses.store(0, Ordering::Relaxed);
            counters.errors.store(0, Ordering::Relaxed);
        }
        for counter in [
            &self.hits,
            &self.misses,
            &self.writes,
            &self.write_failures,
            &self.invalidations,
            &self.backfills,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that failed and were treated as misses
    pub errors: u64,
    pub hit_rate: f64,
}

impl TierStats {
    fn new(hits: u64, misses: u64, errors: u64) -> Self {
        Self {
            hits,
            misses,
            errors,
            hit_rate: ratio(hits, misses),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub tiers: BTreeMap<TierKind, TierStats>,
    /// Lookups answered by any tier
    pub hits: u64,
    /// Lookups no tier could answer
    pub misses: u64,
    pub hit_rate: f64,
    /// Successful per-tier writes
    pub writes: u64,
    pub write_failures: u64,
    pub invalidations: u64,
    /// Memory tier refills from slower tiers
    pub backfills: u64,
}

impl CacheStats {
    pub fn tier(&self, kind: TierKind) -> TierStats {
        self.tiers
            .get(&kind)
            .copied()
            .unwrap_or_else(|| TierStats::new(0, 0, 0))
    }
}
