/*!
 * Endpoint discovery.
 *
 * Discovery walks a topology snapshot, classifies each endpoint, projects
 * controls for the classifiable ones, and records the rest as unsupported.
 * Classification is sticky: an endpoint already classified in the registry is
 * never reclassified here, only re-projected. An empty topology is treated as
 * authoritative and resets the node.
 */
use std::sync::Arc;

use tracing::{debug, info, warn};

use muxnode_devices::controls::SurfaceError;
use muxnode_devices::endpoint::{classify, Topology};
use muxnode_devices::registry::EndpointRegistry;

use crate::projector::CapabilityProjector;

/// Outcome counts for one discovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Endpoints newly classified in this pass
    pub classified: usize,
    /// Endpoints recorded as unsupported in this pass
    pub unsupported: usize,
    /// Endpoints already known and left as-is
    pub known: usize,
    /// Registry entries pruned because the topology no longer lists them
    pub pruned: usize,
}

/// Classifies endpoints and keeps the registry and control set in step
#[derive(Debug)]
pub struct DiscoveryEngine {
    /// The persistent endpoint registry
    registry: Arc<EndpointRegistry>,
    /// The projector managing host-visible controls
    projector: Arc<CapabilityProjector>,
}

impl DiscoveryEngine {
    /// Create a discovery engine
    pub fn new(registry: Arc<EndpointRegistry>, projector: Arc<CapabilityProjector>) -> Self {
        Self {
            registry,
            projector,
        }
    }

    /// Run one discovery pass over a topology snapshot.
    ///
    /// Errors from individual endpoints are contained: a failed projection
    /// leaves that endpoint untouched for the next pass rather than aborting
    /// the walk.
    pub async fn discover_all(&self, topology: &Topology) -> DiscoverySummary {
        if topology.is_empty() {
            return self.reset().await;
        }

        let mut summary = DiscoverySummary::default();
        for (&endpoint, descriptor) in topology {
            if !self.projector.catalog().contains(endpoint) {
                warn!(
                    "Endpoint {} is outside the control catalog (max {}), skipping",
                    endpoint,
                    self.projector.catalog().max_endpoints()
                );
                // A stale entry left by a run with a larger catalog is dropped.
                if self.registry.remove(endpoint).await {
                    if let Err(e) = self.projector.unproject(endpoint).await {
                        warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
                    }
                    summary.pruned += 1;
                }
                continue;
            }
            if self.registry.is_classified(endpoint).await {
                summary.known += 1;
                // Re-ensure controls in case the surface lost them.
                if let Some(kind) = self.registry.kind(endpoint).await {
                    if let Err(e) = self.projector.project(endpoint, kind).await {
                        warn!("Failed to re-project endpoint {}: {}", endpoint, e);
                    }
                }
                continue;
            }

            match classify(descriptor) {
                Some(kind) => match self.projector.project(endpoint, kind).await {
                    Ok(()) => {
                        info!("Classified endpoint {} as {:?}", endpoint, kind);
                        self.registry.set_entry(endpoint, Some(kind)).await;
                        summary.classified += 1;
                    }
                    Err(e @ SurfaceError::Timeout(_)) => {
                        // The host may still materialize the control; commit
                        // the classification so sync can proceed.
                        warn!(
                            "Projection for endpoint {} timed out, committing anyway: {}",
                            endpoint, e
                        );
                        self.registry.set_entry(endpoint, Some(kind)).await;
                        summary.classified += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Projection for endpoint {} failed, will retry next pass: {}",
                            endpoint, e
                        );
                    }
                },
                None => {
                    debug!("Endpoint {} is unsupported", endpoint);
                    self.registry.set_entry(endpoint, None).await;
                    if let Err(e) = self.projector.unproject(endpoint).await {
                        warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
                    }
                    summary.unsupported += 1;
                }
            }
        }

        // Prune registry entries for endpoints the device no longer reports.
        for endpoint in self.registry.ids().await {
            if topology.contains_key(&endpoint) {
                continue;
            }
            info!("Endpoint {} vanished from topology, pruning", endpoint);
            self.registry.remove(endpoint).await;
            if let Err(e) = self.projector.unproject(endpoint).await {
                warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
            }
            summary.pruned += 1;
        }

        if let Err(e) = self.registry.persist().await {
            warn!("Failed to persist endpoint registry: {}", e);
        }

        info!(
            "Discovery pass: {} classified, {} unsupported, {} known, {} pruned",
            summary.classified, summary.unsupported, summary.known, summary.pruned
        );
        summary
    }

    /// Reset the node after an authoritative empty topology
    async fn reset(&self) -> DiscoverySummary {
        let pruned = self.registry.len().await;
        warn!("Topology is empty, resetting registry and controls");
        self.registry.clear().await;
        for endpoint in self.projector.catalog().endpoint_ids() {
            if let Err(e) = self.projector.unproject(endpoint).await {
                warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
            }
        }
        if let Err(e) = self.registry.persist().await {
            warn!("Failed to persist endpoint registry: {}", e);
        }
        DiscoverySummary {
            pruned,
            ..DiscoverySummary::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxnode_core::types::EndpointId;
    use muxnode_devices::controls::{
        ControlCatalog, ControlId, ControlSurface, MemoryControlSurface, SurfaceError,
    };
    use muxnode_devices::endpoint::EndpointKind;
    use muxnode_devices::sim::SimulatedNode;
    use muxnode_devices::store::{MemoryStore, NodeStore};
    use muxnode_devices::adapter::ProtocolAdapter;

    struct Fixture {
        surface: Arc<MemoryControlSurface>,
        store: Arc<MemoryStore>,
        registry: Arc<EndpointRegistry>,
        engine: DiscoveryEngine,
    }

    fn fixture() -> Fixture {
        fixture_with_catalog(8)
    }

    fn fixture_with_catalog(max_endpoints: u16) -> Fixture {
        let surface = Arc::new(MemoryControlSurface::new());
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(EndpointRegistry::new(store.clone()));
        let projector = Arc::new(CapabilityProjector::new(
            surface.clone(),
            ControlCatalog::new(max_endpoints),
        ));
        let engine = DiscoveryEngine::new(registry.clone(), projector);
        Fixture {
            surface,
            store,
            registry,
            engine,
        }
    }

    #[tokio::test]
    async fn test_classifies_and_projects() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        node.add_switch(EndpointId::new(2), false).await;
        node.add_unsupported(EndpointId::new(3)).await;

        let topology = node.topology().await.unwrap();
        let summary = f.engine.discover_all(&topology).await;

        assert_eq!(summary.classified, 2);
        assert_eq!(summary.unsupported, 1);
        assert_eq!(f.registry.kind(EndpointId::new(1)).await, Some(EndpointKind::Dimmer));
        assert_eq!(f.registry.kind(EndpointId::new(2)).await, Some(EndpointKind::Switch));
        assert_eq!(f.registry.entry(EndpointId::new(3)).await, Some(None));
        assert!(f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(2))).await);
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(3))).await);

        // Persisted for the next restart.
        let saved = f.store.load_registry().await.unwrap();
        assert_eq!(saved.len(), 3);
    }

    #[tokio::test]
    async fn test_classification_is_sticky() {
        let f = fixture();
        f.registry
            .set_entry(EndpointId::new(1), Some(EndpointKind::Switch))
            .await;

        // The topology now claims a dimmer, but the stored classification wins.
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        let topology = node.topology().await.unwrap();
        let summary = f.engine.discover_all(&topology).await;

        assert_eq!(summary.known, 1);
        assert_eq!(summary.classified, 0);
        assert_eq!(f.registry.kind(EndpointId::new(1)).await, Some(EndpointKind::Switch));
        // Re-projection ensured the switch's control, not a dim control.
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);
        assert!(!f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);
    }

    #[tokio::test]
    async fn test_prunes_vanished_endpoints() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        node.add_switch(EndpointId::new(2), false).await;
        f.engine.discover_all(&node.topology().await.unwrap()).await;

        node.remove_endpoint(EndpointId::new(2)).await;
        let summary = f.engine.discover_all(&node.topology().await.unwrap()).await;

        assert_eq!(summary.pruned, 1);
        assert_eq!(f.registry.entry(EndpointId::new(2)).await, None);
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(2))).await);
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);
    }

    #[tokio::test]
    async fn test_out_of_catalog_endpoints_are_skipped() {
        let f = fixture_with_catalog(2);
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        node.add_dimmer(EndpointId::new(5), 40).await;

        let summary = f.engine.discover_all(&node.topology().await.unwrap()).await;

        // Endpoint 5 cannot be represented and must get neither a registry
        // entry nor controls.
        assert_eq!(summary.classified, 1);
        assert_eq!(f.registry.entry(EndpointId::new(5)).await, None);
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(5))).await);
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);

        // A full reset leaves nothing behind either.
        node.clear_topology().await;
        f.engine.discover_all(&node.topology().await.unwrap()).await;
        assert!(f.surface.controls().await.is_empty());
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_out_of_catalog_registry_entry_is_dropped() {
        let f = fixture_with_catalog(2);
        // Entry left over from a run with a larger catalog.
        f.registry
            .set_entry(EndpointId::new(5), Some(EndpointKind::Dimmer))
            .await;

        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(5), 0).await;
        let summary = f.engine.discover_all(&node.topology().await.unwrap()).await;

        assert_eq!(summary.pruned, 1);
        assert_eq!(f.registry.entry(EndpointId::new(5)).await, None);
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(5))).await);
    }

    #[tokio::test]
    async fn test_projection_timeout_commits_classification() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        let topology = node.topology().await.unwrap();

        f.surface.fail_next_ensure(SurfaceError::timeout("host busy"));
        let summary = f.engine.discover_all(&topology).await;

        // Failure to respond is not evidence of absence.
        assert_eq!(summary.classified, 1);
        assert_eq!(
            f.registry.kind(EndpointId::new(1)).await,
            Some(EndpointKind::Dimmer)
        );
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);

        // The next pass re-ensures the missing controls.
        let summary = f.engine.discover_all(&topology).await;
        assert_eq!(summary.known, 1);
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);
        assert!(f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);
    }

    #[tokio::test]
    async fn test_projection_rejection_leaves_endpoint_for_next_pass() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        let topology = node.topology().await.unwrap();

        f.surface
            .fail_next_ensure(SurfaceError::rejected("host refused"));
        let summary = f.engine.discover_all(&topology).await;

        // Untouched: neither classified nor recorded as unsupported.
        assert_eq!(summary.classified, 0);
        assert_eq!(summary.unsupported, 0);
        assert_eq!(f.registry.entry(EndpointId::new(1)).await, None);

        let summary = f.engine.discover_all(&topology).await;
        assert_eq!(summary.classified, 1);
        assert!(f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_authoritative() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        node.add_switch(EndpointId::new(2), false).await;
        let topology = node.topology().await.unwrap();

        f.store.set_fail_saves(true);
        let summary = f.engine.discover_all(&topology).await;

        // The pass completes and in-memory state is intact despite the
        // failed save.
        assert_eq!(summary.classified, 2);
        assert_eq!(
            f.registry.kind(EndpointId::new(1)).await,
            Some(EndpointKind::Dimmer)
        );
        assert!(f.surface.contains(&ControlId::onoff(EndpointId::new(2))).await);
        assert!(f.store.load_registry().await.unwrap().is_empty());

        // The next pass with a healthy store persists everything.
        f.store.set_fail_saves(false);
        f.engine.discover_all(&topology).await;
        assert_eq!(f.store.load_registry().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_topology_resets() {
        let f = fixture();
        let node = SimulatedNode::new();
        node.add_dimmer(EndpointId::new(1), 0).await;
        f.engine.discover_all(&node.topology().await.unwrap()).await;
        assert!(!f.registry.is_empty().await);

        node.clear_topology().await;
        let summary = f.engine.discover_all(&node.topology().await.unwrap()).await;

        assert_eq!(summary.pruned, 1);
        assert!(f.registry.is_empty().await);
        assert!(f.surface.controls().await.is_empty());
    }
}
