//! Cache tier trait definition

use super::entry::CacheEntry;
use super::errors::CacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage backends in the cache hierarchy, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Memory,
    Persistent,
    Distributed,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [TierKind::Memory, TierKind::Persistent, TierKind::Distributed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Persistent => "persistent",
            TierKind::Distributed => "distributed",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform get/set/invalidate contract implemented by every tier
///
/// Keys arrive already normalized by the engine. `get` must never return an
/// expired entry; tiers evict expired entries lazily when they see them.
#[async_trait]
pub trait CacheTier: Send + Sync + fmt::Debug {
    fn kind(&self) -> TierKind;

    /// Returns `Ok(Some(entry))` on hit, `Ok(None)` on miss or expiry
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store a full replacement entry
    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<()>;

    async fn invalidate(&self, key: &str) -> CacheResult<()>;

    /// Drop every expired entry, returning how many were removed
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }
}
