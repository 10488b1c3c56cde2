//! # Configuration
//!
//! Typed configuration for the reliability core. Every section carries serde
//! defaults so partial TOML files and environment overrides layer cleanly.
//! [`ConfigManager`] handles source discovery and layering.

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;
use crate::error::{ErrorKind, RetryCategory};
use crate::recovery::StrategyAction;
use crate::resilience::CircuitBreakerSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breakers: CircuitBreakerConfig,
    pub error_handling: ErrorHandlingConfig,
    pub events: EventsConfig,
}

impl ReliabilityConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.retry.validate()?;
        self.circuit_breakers.validate()?;
        self.error_handling.validate()?;

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                0,
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_ttl_seconds: u64,
    pub memory_max_entries: usize,
    pub persistent_enabled: bool,
    pub persistent_path: PathBuf,
    pub persistent_ttl_seconds: u64,
    pub distributed_enabled: bool,
    pub distributed_endpoint: Option<String>,
    pub distributed_ttl_seconds: u64,
    pub distributed_namespace: String,
    /// Interval of the background expiry sweep; 0 disables it
    pub sweep_interval_seconds: u64,
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }

    pub fn persistent_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_ttl_seconds)
    }

    pub fn distributed_ttl(&self) -> Duration {
        Duration::from_secs(self.distributed_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.memory_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.memory_ttl_seconds",
                0,
                "must be greater than 0",
            ));
        }

        if self.persistent_enabled && self.persistent_path.as_os_str().is_empty() {
            return Err(ConfigurationError::ValidationError(
                "cache.persistent_path is required when the persistent tier is enabled".to_string(),
            ));
        }

        if self.persistent_enabled && self.persistent_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.persistent_ttl_seconds",
                0,
                "must be greater than 0",
            ));
        }

        if self.distributed_enabled {
            let endpoint = self.distributed_endpoint.as_deref().unwrap_or_default();
            if endpoint.trim().is_empty() {
                return Err(ConfigurationError::ValidationError(
                    "cache.distributed_endpoint is required when the distributed tier is enabled"
                        .to_string(),
                ));
            }
            if self.distributed_ttl_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    "cache.distributed_ttl_seconds",
                    0,
                    "must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_seconds: defaults::MEMORY_TTL_SECONDS,
            memory_max_entries: defaults::MEMORY_MAX_ENTRIES,
            persistent_enabled: true,
            persistent_path: PathBuf::from("tmp/cache"),
            persistent_ttl_seconds: defaults::PERSISTENT_TTL_SECONDS,
            distributed_enabled: false,
            distributed_endpoint: None,
            distributed_ttl_seconds: defaults::DISTRIBUTED_TTL_SECONDS,
            distributed_namespace: "estimator".to_string(),
            sweep_interval_seconds: defaults::CACHE_SWEEP_INTERVAL_SECONDS,
        }
    }
}

/// Retry policy for one retry category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub max_delay_ms: u64,
    pub retryable_kinds: Vec<ErrorKind>,
}

impl RetryPolicyConfig {
    fn validate(&self, category: RetryCategory) -> ConfigResult<()> {
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            return Err(ConfigurationError::invalid_value(
                format!("retry.{category}.backoff_factor"),
                self.backoff_factor,
                "must be a finite number >= 1.0",
            ));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                format!("retry.{category}.base_delay_ms"),
                self.base_delay_ms,
                "must not exceed max_delay_ms",
            ));
        }

        Ok(())
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            jitter: true,
            max_delay_ms: 30_000,
            retryable_kinds: vec![
                ErrorKind::Timeout,
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::ServerBusy,
                ErrorKind::ExternalApi,
            ],
        }
    }
}

/// Retry policies keyed by retry category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(alias = "external-api")]
    pub external_api: RetryPolicyConfig,
    pub database: RetryPolicyConfig,
    #[serde(alias = "ai-model")]
    pub ai_model: RetryPolicyConfig,
    pub processing: RetryPolicyConfig,
}

impl RetryConfig {
    pub fn policy(&self, category: RetryCategory) -> &RetryPolicyConfig {
        match category {
            RetryCategory::ExternalApi => &self.external_api,
            RetryCategory::Database => &self.database,
            RetryCategory::AiModel => &self.ai_model,
            RetryCategory::Processing => &self.processing,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for category in [
            RetryCategory::ExternalApi,
            RetryCategory::Database,
            RetryCategory::AiModel,
            RetryCategory::Processing,
        ] {
            self.policy(category).validate(category)?;
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            external_api: RetryPolicyConfig::default(),
            database: RetryPolicyConfig {
                max_retries: 3,
                base_delay_ms: 500,
                backoff_factor: 2.0,
                jitter: true,
                max_delay_ms: 10_000,
                retryable_kinds: vec![
                    ErrorKind::Timeout,
                    ErrorKind::Network,
                    ErrorKind::ServerBusy,
                    ErrorKind::Database,
                ],
            },
            ai_model: RetryPolicyConfig {
                max_retries: 2,
                base_delay_ms: 2000,
                backoff_factor: 2.0,
                jitter: true,
                max_delay_ms: 60_000,
                retryable_kinds: vec![
                    ErrorKind::Timeout,
                    ErrorKind::Network,
                    ErrorKind::RateLimit,
                    ErrorKind::ServerBusy,
                    ErrorKind::AiModel,
                ],
            },
            processing: RetryPolicyConfig {
                max_retries: 1,
                base_delay_ms: 1000,
                backoff_factor: 1.5,
                jitter: false,
                max_delay_ms: 5000,
                retryable_kinds: vec![ErrorKind::Timeout, ErrorKind::Processing],
            },
        }
    }
}

/// System-wide circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Soft limit; exceeding it is logged
    pub max_circuit_breakers: usize,
    pub default_config: CircuitBreakerSettings,
    pub component_configs: HashMap<String, CircuitBreakerSettings>,
}

impl CircuitBreakerConfig {
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerSettings {
        self.component_configs
            .get(component_name)
            .copied()
            .unwrap_or(self.default_config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.max_circuit_breakers",
                0,
                "must be greater than 0",
            ));
        }

        self.default_config.validate().map_err(|e| {
            ConfigurationError::ValidationError(format!("circuit_breakers.default_config: {e}"))
        })?;

        for (name, settings) in &self.component_configs {
            settings.validate().map_err(|e| {
                ConfigurationError::ValidationError(format!(
                    "circuit_breakers.component_configs.{name}: {e}"
                ))
            })?;
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        let component_configs = HashMap::from([
            ("ai_model".to_string(), CircuitBreakerSettings::for_ai_model()),
            (
                "distributed_cache".to_string(),
                CircuitBreakerSettings::for_distributed_cache(),
            ),
        ]);

        Self {
            enabled: true,
            max_circuit_breakers: 50,
            default_config: CircuitBreakerSettings::default(),
            component_configs,
        }
    }
}

/// Keyword rule consulted when indicators and the advisor give no answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicRule {
    pub keyword: String,
    pub action: StrategyAction,
}

impl HeuristicRule {
    pub fn new(keyword: impl Into<String>, action: StrategyAction) -> Self {
        Self {
            keyword: keyword.into(),
            action,
        }
    }
}

/// Recovery action for a (service, kind) pair; service `*` matches any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryActionMapping {
    pub service: String,
    pub kind: ErrorKind,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Per-service ledger capacity
    pub log_capacity: usize,
    pub retention_seconds: u64,
    pub rate_window_seconds: u64,
    pub rate_check_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub summary_interval_seconds: u64,
    pub default_error_rate_threshold: usize,
    pub error_rate_thresholds: HashMap<String, usize>,
    pub transient_indicators: Vec<String>,
    pub critical_indicators: Vec<String>,
    pub heuristic_rules: Vec<HeuristicRule>,
    pub recovery_actions: Vec<RecoveryActionMapping>,
    pub advisor_timeout_ms: u64,
}

impl ErrorHandlingConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_seconds)
    }

    pub fn rate_check_interval(&self) -> Duration {
        Duration::from_secs(self.rate_check_interval_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_seconds)
    }

    pub fn advisor_timeout(&self) -> Duration {
        Duration::from_millis(self.advisor_timeout_ms)
    }

    pub fn threshold_for(&self, service: &str) -> usize {
        self.error_rate_thresholds
            .get(service)
            .copied()
            .unwrap_or(self.default_error_rate_threshold)
    }

    /// Exact service mappings win over `*`
    pub fn recovery_action_for(&self, service: &str, kind: ErrorKind) -> Option<&str> {
        let exact = self
            .recovery_actions
            .iter()
            .find(|mapping| mapping.kind == kind && mapping.service == service);

        exact
            .or_else(|| {
                self.recovery_actions
                    .iter()
                    .find(|mapping| mapping.kind == kind && mapping.service == "*")
            })
            .map(|mapping| mapping.action.as_str())
    }

    fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("error_handling.log_capacity", self.log_capacity as u64),
            ("error_handling.retention_seconds", self.retention_seconds),
            ("error_handling.rate_window_seconds", self.rate_window_seconds),
            (
                "error_handling.rate_check_interval_seconds",
                self.rate_check_interval_seconds,
            ),
            (
                "error_handling.cleanup_interval_seconds",
                self.cleanup_interval_seconds,
            ),
            (
                "error_handling.summary_interval_seconds",
                self.summary_interval_seconds,
            ),
            (
                "error_handling.default_error_rate_threshold",
                self.default_error_rate_threshold as u64,
            ),
            ("error_handling.advisor_timeout_ms", self.advisor_timeout_ms),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than 0",
                ));
            }
        }

        if let Some(rule) = self.heuristic_rules.iter().find(|r| r.keyword.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "error_handling.heuristic_rules.keyword",
                &rule.keyword,
                "keywords must not be empty",
            ));
        }

        Ok(())
    }
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        let words = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();

        Self {
            log_capacity: defaults::ERROR_LOG_CAPACITY,
            retention_seconds: defaults::ERROR_RETENTION_SECONDS,
            rate_window_seconds: defaults::ERROR_RATE_WINDOW_SECONDS,
            rate_check_interval_seconds: defaults::ERROR_RATE_CHECK_INTERVAL_SECONDS,
            cleanup_interval_seconds: defaults::ERROR_CLEANUP_INTERVAL_SECONDS,
            summary_interval_seconds: defaults::ERROR_SUMMARY_INTERVAL_SECONDS,
            default_error_rate_threshold: defaults::ERROR_RATE_THRESHOLD,
            error_rate_thresholds: HashMap::new(),
            transient_indicators: words(&[
                "timeout",
                "timed out",
                "rate limit",
                "rate_limit",
                "network",
                "server busy",
                "server_busy",
                "throttled",
            ]),
            critical_indicators: words(&[
                "authentication",
                "unauthorized",
                "data corruption",
                "data_corruption",
                "resource exhaustion",
                "resource_exhaustion",
                "security",
            ]),
            heuristic_rules: vec![
                HeuristicRule::new("timeout", StrategyAction::Retry),
                HeuristicRule::new("network", StrategyAction::Retry),
                HeuristicRule::new("memory", StrategyAction::Escalate),
                HeuristicRule::new("resource", StrategyAction::Escalate),
            ],
            recovery_actions: Vec::new(),
            advisor_timeout_ms: defaults::ADVISOR_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReliabilityConfig::default().validate().is_ok());
    }

    #[test]
    fn test_distributed_requires_endpoint() {
        let mut config = ReliabilityConfig::default();
        config.cache.distributed_enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError(_))
        ));

        config.cache.distributed_endpoint = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_factor_below_one_rejected() {
        let mut config = ReliabilityConfig::default();
        config.retry.database.backoff_factor = 0.5;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("retry.database.backoff_factor"));
    }

    #[test]
    fn test_recovery_action_lookup_prefers_exact_service() {
        let config = ErrorHandlingConfig {
            recovery_actions: vec![
                RecoveryActionMapping {
                    service: "*".to_string(),
                    kind: ErrorKind::Database,
                    action: "reconnect_database".to_string(),
                },
                RecoveryActionMapping {
                    service: "quotes".to_string(),
                    kind: ErrorKind::Database,
                    action: "rebuild_quote_cache".to_string(),
                },
            ],
            ..Default::default()
        };

        assert_eq!(
            config.recovery_action_for("quotes", ErrorKind::Database),
            Some("rebuild_quote_cache")
        );
        assert_eq!(
            config.recovery_action_for("materials", ErrorKind::Database),
            Some("reconnect_database")
        );
        assert_eq!(config.recovery_action_for("quotes", ErrorKind::Network), None);
    }

    #[test]
    fn test_threshold_override() {
        let mut config = ErrorHandlingConfig::default();
        config.error_rate_thresholds.insert("ai_extraction".to_string(), 3);
        assert_eq!(config.threshold_for("ai_extraction"), 3);
        assert_eq!(config.threshold_for("quotes"), defaults::ERROR_RATE_THRESHOLD);
    }

    #[test]
    fn test_circuit_breaker_component_lookup() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(
            config.config_for_component("ai_model"),
            CircuitBreakerSettings::for_ai_model()
        );
        assert_eq!(
            config.config_for_component("unknown"),
            CircuitBreakerSettings::default()
        );
    }
}
