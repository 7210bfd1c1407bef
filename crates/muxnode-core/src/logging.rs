/*!
 * Logging functionality for MuxNode.
 *
 * This module provides tracing setup and utilities for consistent logging
 * across the MuxNode ecosystem.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "muxnode=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Initialize the logging system from a loaded configuration section
///
/// # Arguments
///
/// * `config` - The logging section of the application configuration
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    if !config.stdout {
        // Filter only, no output layer.
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
        tracing_subscriber::registry()
            .with(filter)
            .try_init()
            .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;
        return Ok(());
    }

    init_with_filter(&config.level)
}
