//! # Tiered Cache
//!
//! Memory, persistent (one JSON file per key) and distributed tiers behind a
//! single [`TieredCache`] facade. Every tier stores a [`CacheEntry`] carrying
//! its own absolute expiry, so any tier can be read without consulting the
//! others.

pub mod engine;
pub mod entry;
pub mod errors;
pub mod keys;
pub mod stats;
pub mod tiers;
pub mod traits;

pub use engine::{TieredCache, TieredCacheBuilder, DEFAULT_READ_TIERS};
pub use entry::CacheEntry;
pub use errors::{CacheError, CacheResult};
pub use keys::normalize_key;
pub use stats::{CacheStats, TierStats};
pub use tiers::{DistributedTier, KeyValueStore, MemoryTier, PersistentTier};
pub use traits::{CacheTier, TierKind};

#[cfg(feature = "cache-redis")]
pub use tiers::RedisStore;
