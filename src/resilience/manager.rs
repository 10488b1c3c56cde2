//! # Circuit Breaker Manager
//!
//! Owns every named circuit breaker. Breakers are created lazily on first use
//! with per-component settings from configuration, or with call-site options
//! when going through [`CircuitBreakerManager::with_circuit_breaker`].

use crate::config::CircuitBreakerConfig;
use crate::error::Result;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitBreakerOptions, CircuitBreakerSettings,
    CircuitSnapshot, CircuitState, SystemCircuitBreakerMetrics,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            enabled = config.enabled,
            components = config.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(DashMap::new()),
            config: config.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get or create the breaker for a component using configured settings
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(component_name, None)
    }

    fn get_or_create(
        &self,
        component_name: &str,
        settings: Option<CircuitBreakerSettings>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.get(component_name) {
            return Arc::clone(existing.value());
        }

        let current_count = self.circuit_breakers.len();
        if current_count >= self.config.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count = current_count,
                max_allowed = self.config.max_circuit_breakers,
                "🚨 Maximum circuit breaker limit reached"
            );
        }

        let breaker = self
            .circuit_breakers
            .entry(component_name.to_string())
            .or_insert_with(|| {
                let settings =
                    settings.unwrap_or_else(|| self.config.config_for_component(component_name));
                Arc::new(CircuitBreaker::new(component_name.to_string(), settings))
            });

        Arc::clone(breaker.value())
    }

    /// Run `operation` through the named circuit
    ///
    /// With breakers disabled in configuration the operation runs unguarded.
    pub async fn with_circuit_breaker<F, Fut, T>(
        &self,
        options: &CircuitBreakerOptions,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.config.enabled {
            return operation().await;
        }

        self.get_or_create(&options.circuit_name, options.settings)
            .call(operation)
            .await
    }

    /// Shorthand for [`Self::with_circuit_breaker`] with configured settings
    pub async fn call<F, Fut, T>(&self, component_name: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_circuit_breaker(&CircuitBreakerOptions::new(component_name), operation)
            .await
    }

    pub fn list_components(&self) -> Vec<String> {
        self.circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn snapshot(&self, component_name: &str) -> Option<CircuitSnapshot> {
        self.circuit_breakers
            .get(component_name)
            .map(|breaker| breaker.snapshot())
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn get_component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers
            .get(component_name)
            .map(|breaker| breaker.metrics())
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Force one circuit open; returns false for unknown circuits
    pub fn force_open(&self, component_name: &str) -> bool {
        match self.circuit_breakers.get(component_name) {
            Some(breaker) => {
                breaker.force_open();
                true
            }
            None => false,
        }
    }

    pub fn force_closed(&self, component_name: &str) -> bool {
        match self.circuit_breakers.get(component_name) {
            Some(breaker) => {
                breaker.force_closed();
                true
            }
            None => false,
        }
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");
        for entry in self.circuit_breakers.iter() {
            entry.value().force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");
        for entry in self.circuit_breakers.iter() {
            entry.value().force_closed();
        }
    }

    pub fn remove_circuit_breaker(&self, component_name: &str) -> bool {
        let removed = self.circuit_breakers.remove(component_name).is_some();
        if removed {
            info!(
                component = component_name,
                remaining_count = self.circuit_breakers.len(),
                "🗑️ Removed circuit breaker"
            );
        }
        removed
    }

    pub fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().count_by_state()
    }

    pub fn system_health_score(&self) -> f64 {
        self.get_system_metrics().health_score()
    }
}
