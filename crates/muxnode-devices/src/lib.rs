/*!
 * MuxNode Devices
 *
 * This crate provides the node-side building blocks for the MuxNode system:
 * the typed endpoint model, the protocol adapter boundary, host-visible
 * controls, the persisted endpoint registry, and a simulated multi-channel
 * node for tests and development.
 */

#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]

// Re-export core types
pub use muxnode_core::prelude;

pub mod adapter;
pub mod controls;
pub mod endpoint;
pub mod registry;
pub mod sim;
pub mod store;

// Re-export the main types for convenience
pub use adapter::{AdapterError, ProtocolAdapter, Report, ReportEvent};
pub use controls::{ControlCatalog, ControlId, ControlKind, ControlSurface, MemoryControlSurface, SurfaceError};
pub use endpoint::{classify, CommandClass, EndpointDescriptor, EndpointKind, GenericClass, Topology};
pub use registry::EndpointRegistry;
pub use sim::SimulatedNode;
pub use store::{JsonFileStore, MemoryStore, NodeStore, RegistrySnapshot, StoreError};

/// MuxNode devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the devices subsystem
pub fn init() -> Result<(), muxnode_core::error::Error> {
    tracing::info!("MuxNode Devices {} initialized", VERSION);
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
