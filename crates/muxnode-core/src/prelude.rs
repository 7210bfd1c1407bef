/*!
 * Prelude module for MuxNode Core.
 *
 * This module re-exports commonly used types and functions from the MuxNode Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{EndpointId, Value};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, EngineConfig, LoggingConfig, SharedConfig};

// Re-export utility functions
pub use crate::utils::{duration_to_millis, millis_to_duration, spawn_and_log, spawn_task};

// Re-export logging macros
pub use tracing::{trace, debug, info, warn, error};

// Re-export core initialization
pub use crate::init;
