//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection and layering through the `config` crate.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::DocflowConfig;

/// Base file name looked up in the configuration directory
const BASE_FILE_STEM: &str = "docflow";

/// Loaded and validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: DocflowConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if config_dir_is_explicit_and_missing(&config_directory) {
            return Err(ConfigurationError::DirectoryNotFound(
                config_directory.display().to_string(),
            ));
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            config_directory = %config_directory.display(),
            max_retries = config.recovery.max_retries,
            job_timeout_ms = config.recovery.job_timeout_ms,
            large_file_threshold_bytes = config.queue.large_file_threshold_bytes,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Some(config_directory),
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: DocflowConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DocflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("DOCFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("DOCFLOW_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<DocflowConfig> {
        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        debug!(
            base_file = %base_file.display(),
            env_file = %env_file.display(),
            "Resolving configuration layers"
        );

        let settings = Config::builder()
            .add_source(File::from(base_file.as_path()).required(false))
            .add_source(File::from(env_file.as_path()).required(false))
            .add_source(
                Environment::with_prefix("DOCFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_failed(config_directory.display().to_string(), e))?;

        settings
            .try_deserialize::<DocflowConfig>()
            .map_err(|e| ConfigurationError::load_failed(config_directory.display().to_string(), e))
    }
}

/// The default directory may legitimately be absent; an explicit one may not
fn config_dir_is_explicit_and_missing(dir: &Path) -> bool {
    dir != Path::new("config") && !dir.exists()
}
