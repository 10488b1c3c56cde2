//! Distributed cache tier over an external key-value store
//!
//! Best effort only: the store is an outside collaborator with no consistency
//! guarantees. A circuit breaker keeps a dead store from adding latency to
//! every lookup. While it is open, reads miss and writes are skipped.

use crate::cache::entry::CacheEntry;
use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::{CacheTier, TierKind};
use crate::error::ReliabilityError;
use crate::resilience::CircuitBreaker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Minimal string key-value contract the distributed tier needs
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store with a server-side expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn store_name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct DistributedTier {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl DistributedTier {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn store_name(&self) -> &'static str {
        self.store.store_name()
    }

    fn namespaced(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.namespace)
        }
    }

    /// Run a store call behind the breaker; `Ok(None)` means the call was skipped
    async fn guarded<T, F, Fut>(&self, operation: F) -> CacheResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CacheResult<T>>,
    {
        let Some(breaker) = &self.circuit_breaker else {
            return operation().await.map(Some);
        };

        match breaker
            .call(move || async move { operation().await.map_err(ReliabilityError::from) })
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(ReliabilityError::CircuitOpen { circuit }) => {
                debug!(circuit = %circuit, "Distributed tier skipped, circuit open");
                Ok(None)
            }
            Err(ReliabilityError::Cache(cache_error)) => Err(cache_error),
            Err(other) => Err(CacheError::BackendError(other.to_string())),
        }
    }
}

#[async_trait]
impl CacheTier for DistributedTier {
    fn kind(&self) -> TierKind {
        TierKind::Distributed
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let namespaced = self.namespaced(key);
        let raw = self
            .guarded(|| self.store.get(&namespaced))
            .await?
            .flatten();

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.is_expired() => Ok(Some(entry)),
            Ok(_) => {
                self.guarded(|| self.store.delete(&namespaced)).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Discarding undecodable distributed cache entry");
                self.guarded(|| self.store.delete(&namespaced)).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        let Some(ttl) = entry.remaining_ttl() else {
            return self.invalidate(key).await;
        };
        let namespaced = self.namespaced(key);
        let raw = serde_json::to_string(&entry)?;
        self.guarded(|| self.store.set_ex(&namespaced, &raw, ttl))
            .await?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let namespaced = self.namespaced(key);
        self.guarded(|| self.store.delete(&namespaced)).await?;
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(self.guarded(|| self.store.ping()).await?.unwrap_or(false))
    }
}
