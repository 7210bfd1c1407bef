/*!
 * MuxNode Core
 *
 * This crate provides the core functionality for the MuxNode system,
 * including shared types, configuration, and logging.
 */

#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use chrono;
    pub use futures;
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// MuxNode core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("MuxNode Core {} initialized", VERSION);
    Ok(())
}
