//! Integration tests for the tiered cache across memory, persistent and
//! distributed tiers

use async_trait::async_trait;
use estimator_core::cache::{
    CacheResult, DistributedTier, KeyValueStore, MemoryTier, PersistentTier, TierKind,
    TieredCache, DEFAULT_READ_TIERS,
};
use estimator_core::config::CacheConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MaterialQuote {
    sku: String,
    unit_price: f64,
    quantity: u32,
}

#[derive(Debug, Default)]
struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl: Duration) -> CacheResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "in-memory"
    }
}

async fn two_tier_cache(dir: &TempDir) -> TieredCache {
    let persistent = PersistentTier::open(dir.path().join("cache")).await.unwrap();
    TieredCache::builder()
        .memory(100, Duration::from_secs(300))
        .tier(Arc::new(persistent), Duration::from_secs(3600))
        .build()
}

#[tokio::test]
async fn test_typed_round_trip_across_tiers() {
    let dir = TempDir::new().unwrap();
    let cache = two_tier_cache(&dir).await;

    let quote = MaterialQuote {
        sku: "cedar-2x4-8ft".to_string(),
        unit_price: 7.48,
        quantity: 120,
    };
    let written = cache
        .set("quote:cedar", &quote, None, &DEFAULT_READ_TIERS)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let cached: Option<MaterialQuote> = cache
        .get_as("quote:cedar", &DEFAULT_READ_TIERS)
        .await
        .unwrap();
    assert_eq!(cached, Some(quote));
}

#[tokio::test]
async fn test_persistent_hit_backfills_memory() {
    let dir = TempDir::new().unwrap();
    let cache = two_tier_cache(&dir).await;

    cache
        .set("labor:rate", &json!(65.0), None, &[TierKind::Persistent])
        .await
        .unwrap();

    assert_eq!(cache.get("labor:rate", &[TierKind::Memory]).await, None);
    assert_eq!(
        cache.get("labor:rate", &DEFAULT_READ_TIERS).await,
        Some(json!(65.0))
    );
    assert_eq!(cache.stats().backfills, 1);

    // Now served by memory alone
    assert_eq!(
        cache.get("labor:rate", &[TierKind::Memory]).await,
        Some(json!(65.0))
    );
    let stats = cache.stats();
    assert_eq!(stats.tier(TierKind::Persistent).hits, 1);
    assert_eq!(stats.tier(TierKind::Memory).hits, 1);
}

#[tokio::test]
async fn test_persistent_entries_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let cache = two_tier_cache(&dir).await;
        cache
            .set("permit:fee:austin", &json!(150), None, &DEFAULT_READ_TIERS)
            .await
            .unwrap();
    }

    let restarted = two_tier_cache(&dir).await;
    assert_eq!(
        restarted.get("permit:fee:austin", &DEFAULT_READ_TIERS).await,
        Some(json!(150))
    );
}

#[tokio::test]
async fn test_invalidate_everywhere_clears_every_tier() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::default());
    let persistent = PersistentTier::open(dir.path().join("cache")).await.unwrap();
    let cache = TieredCache::builder()
        .memory(100, Duration::from_secs(300))
        .tier(Arc::new(persistent), Duration::from_secs(3600))
        .tier(
            Arc::new(DistributedTier::new(store.clone(), "estimator")),
            Duration::from_secs(600),
        )
        .build();

    let all = [TierKind::Memory, TierKind::Persistent, TierKind::Distributed];
    assert_eq!(cache.set("k", &json!("v"), None, &all).await.unwrap(), 3);
    assert_eq!(store.values.lock().len(), 1);

    assert_eq!(cache.invalidate_everywhere("k").await, 3);
    assert!(store.values.lock().is_empty());
    assert_eq!(cache.get("k", &all).await, None);
}

#[tokio::test]
async fn test_distributed_hit_backfills_memory() {
    let store = Arc::new(InMemoryStore::default());
    let cache = TieredCache::builder()
        .memory(100, Duration::from_secs(300))
        .tier(
            Arc::new(DistributedTier::new(store.clone(), "estimator")),
            Duration::from_secs(600),
        )
        .build();

    cache
        .set("shared", &json!([1, 2, 3]), None, &[TierKind::Distributed])
        .await
        .unwrap();

    let read_order = [TierKind::Memory, TierKind::Distributed];
    assert_eq!(cache.get("shared", &read_order).await, Some(json!([1, 2, 3])));
    assert_eq!(cache.stats().backfills, 1);
    assert_eq!(
        cache.get("shared", &[TierKind::Memory]).await,
        Some(json!([1, 2, 3]))
    );
}

#[tokio::test]
async fn test_warm_computes_once_then_serves_cached() {
    let dir = TempDir::new().unwrap();
    let cache = two_tier_cache(&dir).await;
    let computations = AtomicUsize::new(0);

    for _ in 0..3 {
        let total: f64 = cache
            .warm(
                "estimate:deck:240sqft",
                || async {
                    computations.fetch_add(1, Ordering::SeqCst);
                    Ok(9_600.0)
                },
                Some(Duration::from_secs(60)),
                &DEFAULT_READ_TIERS,
            )
            .await
            .unwrap();
        assert_eq!(total, 9_600.0);
    }

    assert_eq!(computations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_memory_overflow_evicts_without_losing_newest() {
    let memory = Arc::new(MemoryTier::new(10));
    let cache = TieredCache::builder()
        .tier(memory.clone(), Duration::from_secs(300))
        .build();

    for i in 0..25 {
        cache
            .set(&format!("k{i}"), &i, None, &[TierKind::Memory])
            .await
            .unwrap();
    }

    assert!(memory.len() <= 10);
    assert!(memory.evictions() > 0);
    assert_eq!(cache.get("k24", &[TierKind::Memory]).await, Some(json!(24)));
}

#[tokio::test]
async fn test_from_config_builds_configured_tiers() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        persistent_path: dir.path().join("cache"),
        ..Default::default()
    };

    let cache = TieredCache::from_config(&config, None).await.unwrap();
    assert_eq!(
        cache.configured_tiers(),
        vec![TierKind::Memory, TierKind::Persistent]
    );

    let health = cache.health_check().await;
    assert!(health.values().all(|healthy| *healthy));
}

#[tokio::test]
async fn test_zero_ttl_write_replaces_value_in_every_tier() {
    let dir = TempDir::new().unwrap();
    let cache = two_tier_cache(&dir).await;
    let tiers = [TierKind::Memory, TierKind::Persistent];

    cache
        .set("quote:deck:12x16", "v1", Some(Duration::from_secs(60)), &tiers)
        .await
        .unwrap();
    let written = cache
        .set("quote:deck:12x16", "v2", Some(Duration::ZERO), &tiers)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(cache.get("quote:deck:12x16", &[TierKind::Memory]).await, None);
    assert_eq!(cache.get("quote:deck:12x16", &tiers).await, None);
}
