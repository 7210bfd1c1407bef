/*!
 * MuxNode Engine
 *
 * This crate provides the endpoint discovery and state synchronization
 * engine for MuxNode: classification-driven discovery, capability
 * projection, debounced root-report handling, per-endpoint sync with a
 * retry/demotion policy, a serialized command queue, and a periodic health
 * monitor. The [`node::MuxNode`] type ties the pieces together around one
 * protocol adapter.
 */

#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

// Re-export core types
pub use muxnode_core::prelude;

pub mod debounce;
pub mod discovery;
pub mod error;
pub mod events;
pub mod flow;
pub mod health;
pub mod labels;
pub mod node;
pub mod projector;
pub mod queue;
pub mod sync;

// Re-export the main types for convenience
pub use debounce::ReportDebouncer;
pub use discovery::{DiscoveryEngine, DiscoverySummary};
pub use error::{Error, Result};
pub use events::EndpointEvent;
pub use flow::{CompareOp, EndpointSummary};
pub use health::HealthMonitor;
pub use labels::LabelResolver;
pub use node::{MuxNode, MuxNodeBuilder};
pub use projector::CapabilityProjector;
pub use queue::{CommandQueue, CommandSink};
pub use sync::StateSynchronizer;

/// MuxNode engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine subsystem
pub fn init() -> Result<()> {
    tracing::info!("MuxNode Engine {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
