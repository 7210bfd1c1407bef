/*!
 * Endpoint label resolution.
 *
 * A label is the user-entered override from the node's durable settings when
 * one exists, and a computed default otherwise. Overrides are loaded once at
 * node initialization.
 */
use std::collections::HashMap;

use tracing::warn;

use muxnode_core::types::EndpointId;
use muxnode_devices::controls::ControlCatalog;
use muxnode_devices::endpoint::EndpointKind;
use muxnode_devices::store::NodeStore;

/// Resolves endpoint ids to display names
#[derive(Debug, Default)]
pub struct LabelResolver {
    /// User-entered overrides keyed by endpoint id
    overrides: HashMap<EndpointId, String>,
}

impl LabelResolver {
    /// Create a resolver with no overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides for every endpoint the control catalog covers
    pub async fn load(store: &dyn NodeStore, catalog: &ControlCatalog) -> Self {
        let mut overrides = HashMap::new();
        for endpoint in catalog.endpoint_ids() {
            match store.label_override(endpoint).await {
                Ok(Some(label)) => {
                    overrides.insert(endpoint, label);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to read label override for endpoint {}: {}", endpoint, e);
                }
            }
        }
        Self { overrides }
    }

    /// Get the user-entered override for an endpoint, if any
    pub fn override_for(&self, endpoint: EndpointId) -> Option<&str> {
        self.overrides.get(&endpoint).map(String::as_str)
    }

    /// Resolve the display name for an endpoint
    pub fn resolve(&self, endpoint: EndpointId, kind: Option<EndpointKind>) -> String {
        if let Some(label) = self.overrides.get(&endpoint) {
            return label.clone();
        }
        match kind {
            Some(EndpointKind::Dimmer) => format!("Dimmer {}", endpoint),
            Some(EndpointKind::Switch) => format!("Switch {}", endpoint),
            None => format!("Endpoint {}", endpoint),
        }
    }
}
