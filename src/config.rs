//! # Dispatch Configuration
//!
//! Layered, environment-aware configuration. Later layers override earlier
//! ones:
//!
//! 1. Built-in defaults
//! 2. `{config_dir}/workpull.toml`
//! 3. `{config_dir}/workpull.{environment}.toml`
//! 4. `WORKPULL__*` environment variables, e.g. `WORKPULL__WORKER_COUNT=64`
//!
//! Both files are optional.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{defaults, env};
use crate::error::{DispatchError, DispatchResult};

const CONFIG_FILE_STEM: &str = "workpull";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of workers in the pool
    pub worker_count: usize,
    /// Capacity of the dispatcher mailbox; raised to the worker count if lower
    pub command_buffer_size: usize,
    /// Items between progress log lines
    pub progress_log_interval: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            command_buffer_size: defaults::COMMAND_BUFFER_SIZE,
            progress_log_interval: defaults::PROGRESS_LOG_INTERVAL,
        }
    }
}

impl DispatchConfig {
    /// Load with environment auto-detection from `./config`
    pub fn load() -> DispatchResult<Self> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> DispatchResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load for an explicit environment name, without consulting `WORKPULL_ENV`
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> DispatchResult<Self> {
        let env_source = Environment::with_prefix(env::CONFIG_PREFIX)
            .separator(env::CONFIG_SEPARATOR)
            .try_parsing(true);
        Self::load_layers(config_dir, environment, env_source)
    }

    /// Same layering, with environment overrides taken from `overrides`
    /// instead of the process environment
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: HashMap<String, String>,
    ) -> DispatchResult<Self> {
        let env_source = Environment::with_prefix(env::CONFIG_PREFIX)
            .separator(env::CONFIG_SEPARATOR)
            .try_parsing(true)
            .source(Some(overrides));
        Self::load_layers(config_dir, environment, env_source)
    }

    fn load_layers(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_source: Environment,
    ) -> DispatchResult<Self> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading dispatch configuration"
        );

        let config: DispatchConfig = Config::builder()
            .add_source(Config::try_from(&DispatchConfig::default())?)
            .add_source(Self::file_layer(&config_directory, CONFIG_FILE_STEM))
            .add_source(Self::file_layer(
                &config_directory,
                &format!("{CONFIG_FILE_STEM}.{environment}"),
            ))
            .add_source(env_source)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(
            worker_count = config.worker_count,
            command_buffer_size = config.command_buffer_size,
            progress_log_interval = config.progress_log_interval,
            "Dispatch configuration loaded"
        );
        Ok(config)
    }

    fn file_layer(directory: &Path, stem: &str) -> File<config::FileSourceFile, config::FileFormat> {
        File::from(directory.join(format!("{stem}.toml"))).required(false)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.worker_count == 0 {
            return Err(DispatchError::Configuration(
                "worker_count must be greater than zero".to_string(),
            ));
        }
        if self.worker_count > defaults::MAX_WORKER_COUNT {
            return Err(DispatchError::Configuration(format!(
                "worker_count must not exceed {}",
                defaults::MAX_WORKER_COUNT
            )));
        }
        if self.command_buffer_size == 0 {
            return Err(DispatchError::Configuration(
                "command_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.progress_log_interval == 0 {
            return Err(DispatchError::Configuration(
                "progress_log_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `WORKPULL_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        std::env::var(env::ENVIRONMENT)
            .or_else(|_| std::env::var(env::FALLBACK_ENVIRONMENT))
            .unwrap_or_else(|_| env::DEFAULT_ENVIRONMENT.to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let config =
            DispatchConfig::load_with_overrides(Some(dir.path().to_path_buf()), "test", HashMap::new())
                .unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.command_buffer_size, 1024);
        assert_eq!(config.progress_log_interval, 1000);
    }

    #[test]
    fn test_base_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "workpull.toml", "worker_count = 512\n");

        let config =
            DispatchConfig::load_with_overrides(Some(dir.path().to_path_buf()), "test", HashMap::new())
                .unwrap();
        assert_eq!(config.worker_count, 512);
        assert_eq!(config.command_buffer_size, 1024);
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "workpull.toml", "worker_count = 512\nprogress_log_interval = 10\n");
        write_config(&dir, "workpull.production.toml", "worker_count = 64\n");

        let config = DispatchConfig::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "production",
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(config.worker_count, 64);
        assert_eq!(config.progress_log_interval, 10);
    }

    #[test]
    fn test_env_overrides_win_over_files() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "workpull.toml", "worker_count = 512\n");

        let overrides = HashMap::from([
            ("WORKPULL__WORKER_COUNT".to_string(), "3".to_string()),
            ("WORKPULL__COMMAND_BUFFER_SIZE".to_string(), "16".to_string()),
        ]);
        let config =
            DispatchConfig::load_with_overrides(Some(dir.path().to_path_buf()), "test", overrides)
                .unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.command_buffer_size, 16);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let config = DispatchConfig {
            worker_count: 0,
            ..DispatchConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(matches!(error, DispatchError::Configuration(_)));
        assert!(error.to_string().contains("worker_count"));
    }

    #[test]
    fn test_validation_rejects_oversized_pool() {
        let config = DispatchConfig {
            worker_count: defaults::MAX_WORKER_COUNT + 1,
            ..DispatchConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(matches!(error, DispatchError::Configuration(_)));
        assert!(error.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_validation_rejects_zero_buffer_size() {
        let config = DispatchConfig {
            command_buffer_size: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("command_buffer_size"));
    }

    #[test]
    fn test_invalid_file_value_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "workpull.toml", "worker_count = 0\n");

        let error =
            DispatchConfig::load_with_overrides(Some(dir.path().to_path_buf()), "test", HashMap::new())
                .unwrap_err();
        assert!(matches!(error, DispatchError::Configuration(_)));
    }
}
