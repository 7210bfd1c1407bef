/*!
 * Configuration management for MuxNode.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for MuxNode components.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::millis_to_duration;

/// Core configuration for MuxNode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Data directory for persisted node records
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to stdout
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiet window for coalescing endpoint-less root reports, in milliseconds
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,

    /// Minimum spacing between queued outbound commands, in milliseconds
    #[serde(default = "default_command_spacing_ms")]
    pub command_spacing_ms: u64,

    /// Interval between health monitor passes, in seconds
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Highest endpoint id the control catalog accounts for
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: u16,
}

impl EngineConfig {
    /// Get the root report quiet window as a Duration
    pub fn quiet_window(&self) -> Duration {
        millis_to_duration(self.quiet_window_ms)
    }

    /// Get the command spacing as a Duration
    pub fn command_spacing(&self) -> Duration {
        millis_to_duration(self.command_spacing_ms)
    }

    /// Get the health monitor interval as a Duration
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_version: default_app_version(),
            environment: default_environment(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stdout: default_log_stdout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: default_quiet_window_ms(),
            command_spacing_ms: default_command_spacing_ms(),
            health_interval_secs: default_health_interval_secs(),
            max_endpoints: default_max_endpoints(),
        }
    }
}

fn default_app_name() -> String {
    "muxnode".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_stdout() -> bool {
    true
}

fn default_quiet_window_ms() -> u64 {
    10_000
}

fn default_command_spacing_ms() -> u64 {
    250
}

fn default_health_interval_secs() -> u64 {
    1800
}

fn default_max_endpoints() -> u16 {
    32
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder
            .add_source(config::Config::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?);

        // Add configuration from file if specified
        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        // Add configuration from environment variables if prefix is specified
        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true)
            );
        }

        // Build the config
        let config_lib = config_builder.build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        // Convert to our config type
        let mut config: Config = config_lib.try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        // Override with provided config if specified
        if let Some(override_config) = self.override_with {
            config = override_config;
        }

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "muxnode");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.quiet_window_ms, 10_000);
        assert_eq!(config.engine.command_spacing_ms, 250);
        assert_eq!(config.engine.max_endpoints, 32);
    }

    #[test]
    fn test_engine_durations() {
        let config = EngineConfig::default();
        assert_eq!(config.quiet_window(), Duration::from_secs(10));
        assert_eq!(config.command_spacing(), Duration::from_millis(250));
        assert_eq!(config.health_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.general.app_name, "muxnode");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir().map_err(|e| Error::other(e.to_string()))?;
        let file_path = dir.path().join("config.toml");

        {
            let mut file = File::create(&file_path).map_err(|e| Error::other(e.to_string()))?;
            file.write_all(br#"
                [general]
                app_name = "test-app"
                environment = "testing"

                [engine]
                quiet_window_ms = 100
                command_spacing_ms = 10
            "#).map_err(|e| Error::other(e.to_string()))?;
        }

        let config = ConfigBuilder::new()
            .with_config_file(file_path)
            .build()?;

        assert_eq!(config.general.app_name, "test-app");
        assert_eq!(config.general.environment, "testing");
        assert_eq!(config.engine.quiet_window_ms, 100);
        assert_eq!(config.engine.command_spacing_ms, 10);
        // Untouched sections keep their defaults
        assert_eq!(config.engine.max_endpoints, 32);

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("MUXNODE__GENERAL__APP_NAME", "env-app");
        env::set_var("MUXNODE__ENGINE__QUIET_WINDOW_MS", "500");

        let config = ConfigBuilder::new()
            .with_environment_prefix("muxnode")
            .build()?;

        assert_eq!(config.general.app_name, "env-app");
        assert_eq!(config.engine.quiet_window_ms, 500);

        // Clean up
        env::remove_var("MUXNODE__GENERAL__APP_NAME");
        env::remove_var("MUXNODE__ENGINE__QUIET_WINDOW_MS");

        Ok(())
    }

    #[test]
    fn test_shared_config() {
        let config = Config::default();
        let shared = SharedConfig::new(config);

        assert_eq!(shared.get().general.app_name, "muxnode");

        let shared2 = shared.clone();
        assert_eq!(shared2.get().general.app_name, "muxnode");
    }
}
