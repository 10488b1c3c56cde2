//! Cache tier implementations

pub mod distributed;
pub mod memory;
pub mod persistent;

#[cfg(feature = "cache-redis")]
pub mod redis;

pub use distributed::{DistributedTier, KeyValueStore};
pub use memory::MemoryTier;
pub use persistent::PersistentTier;

#[cfg(feature = "cache-redis")]
pub use self::redis::RedisStore;
