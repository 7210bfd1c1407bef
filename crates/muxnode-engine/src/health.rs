/*!
 * Periodic health checks.
 *
 * The monitor watches for the one inconsistency that otherwise persists
 * silently: controls visible on the host while the registry holds no
 * classified endpoint, typically after a corrupted or wiped registry file.
 * On detection it refreshes the topology and reruns discovery.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use muxnode_devices::adapter::ProtocolAdapter;
use muxnode_devices::controls::ControlSurface;
use muxnode_devices::endpoint::Topology;
use muxnode_devices::registry::EndpointRegistry;

use crate::discovery::DiscoveryEngine;

/// Detects and repairs registry/control inconsistencies
#[derive(Debug)]
pub struct HealthMonitor {
    /// Time between checks
    interval: Duration,
    /// The persistent endpoint registry
    registry: Arc<EndpointRegistry>,
    /// The host-visible control surface
    surface: Arc<dyn ControlSurface>,
    /// The protocol adapter used to refresh the topology
    adapter: Arc<dyn ProtocolAdapter>,
    /// The discovery engine used for the repair pass
    discovery: Arc<DiscoveryEngine>,
    /// The shared topology cache to refresh before repairing
    topology: Arc<RwLock<Topology>>,
}

impl HealthMonitor {
    /// Create a health monitor
    pub fn new(
        interval: Duration,
        registry: Arc<EndpointRegistry>,
        surface: Arc<dyn ControlSurface>,
        adapter: Arc<dyn ProtocolAdapter>,
        discovery: Arc<DiscoveryEngine>,
        topology: Arc<RwLock<Topology>>,
    ) -> Self {
        Self {
            interval,
            registry,
            surface,
            adapter,
            discovery,
            topology,
        }
    }

    /// Run one health check, repairing if needed.
    ///
    /// Returns whether a repair pass ran.
    pub async fn tick(&self) -> bool {
        let has_controls = !self.surface.controls().await.is_empty();
        let classified = self.registry.classified_count().await;
        if !has_controls || classified > 0 {
            debug!("Health check passed: {} classified endpoints", classified);
            return false;
        }

        warn!("Controls exist but no endpoint is classified, rerunning discovery");
        let snapshot = match self.adapter.topology().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Health repair could not fetch topology: {}", e);
                return false;
            }
        };
        *self.topology.write().await = snapshot.clone();
        self.discovery.discover_all(&snapshot).await;
        true
    }

    /// Spawn the periodic check loop
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxnode_core::types::EndpointId;
    use muxnode_devices::controls::{ControlCatalog, ControlId, MemoryControlSurface};
    use muxnode_devices::endpoint::EndpointKind;
    use muxnode_devices::sim::SimulatedNode;
    use muxnode_devices::store::MemoryStore;

    use crate::projector::CapabilityProjector;

    struct Fixture {
        surface: Arc<MemoryControlSurface>,
        registry: Arc<EndpointRegistry>,
        monitor: Arc<HealthMonitor>,
    }

    async fn fixture(interval: Duration) -> Fixture {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 30).await;
        let surface = Arc::new(MemoryControlSurface::new());
        let registry = Arc::new(EndpointRegistry::new(Arc::new(MemoryStore::new())));
        let projector = Arc::new(CapabilityProjector::new(
            surface.clone(),
            ControlCatalog::new(8),
        ));
        let discovery = Arc::new(DiscoveryEngine::new(registry.clone(), projector.clone()));
        let topology = Arc::new(RwLock::new(node.topology().await.unwrap()));
        discovery.discover_all(&*topology.read().await).await;

        let monitor = Arc::new(HealthMonitor::new(
            interval,
            registry.clone(),
            surface.clone(),
            node.clone(),
            discovery,
            topology,
        ));
        Fixture {
            surface,
            registry,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_tick_passes_when_consistent() {
        let f = fixture(Duration::from_secs(1800)).await;
        assert!(!f.monitor.tick().await);
    }

    #[tokio::test]
    async fn test_tick_repairs_wiped_registry() {
        let f = fixture(Duration::from_secs(1800)).await;

        // Simulate a wiped registry with controls left behind.
        f.registry.clear().await;
        assert!(f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);

        assert!(f.monitor.tick().await);
        assert_eq!(
            f.registry.kind(EndpointId::new(1)).await,
            Some(EndpointKind::Dimmer)
        );
    }

    #[tokio::test]
    async fn test_empty_surface_is_not_an_inconsistency() {
        let f = fixture(Duration::from_secs(1800)).await;
        f.registry.clear().await;
        for control in f.surface.controls().await {
            f.surface.remove(&control).await.unwrap();
        }
        assert!(!f.monitor.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_repairs_on_schedule() {
        let f = fixture(Duration::from_secs(1)).await;
        f.registry.clear().await;

        let handle = f.monitor.clone().spawn();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(
            f.registry.kind(EndpointId::new(1)).await,
            Some(EndpointKind::Dimmer)
        );
        handle.abort();
    }
}
