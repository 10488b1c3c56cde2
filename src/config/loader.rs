//! Configuration Loader
//!
//! Environment-aware loading with the `config` crate. Sources are layered,
//! later ones overriding earlier ones:
//!
//! 1. `<dir>/reliability.toml`
//! 2. `<dir>/reliability.<environment>.toml`
//! 3. `ESTIMATOR__<SECTION>__<KEY>` environment variables
//!
//! Missing files are skipped; serde defaults fill whatever no source sets.

use super::error::{ConfigResult, ConfigurationError};
use super::ReliabilityConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONFIG_FILE_STEM: &str = "reliability";
pub const ENV_PREFIX: &str = "ESTIMATOR";

#[derive(Debug)]
pub struct ConfigManager {
    config: ReliabilityConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment, without consulting `ESTIMATOR_ENV`
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading reliability configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            persistent_cache = config.cache.persistent_enabled,
            distributed_cache = config.cache.distributed_enabled,
            circuit_breakers = config.circuit_breakers.enabled,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ReliabilityConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<ReliabilityConfig> {
        if !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: config_directory.to_path_buf(),
            });
        }

        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let settings = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize::<ReliabilityConfig>()?)
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn detect_environment() -> String {
        env::var("ESTIMATOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
