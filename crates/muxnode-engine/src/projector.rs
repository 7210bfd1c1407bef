/*!
 * Capability projection.
 *
 * The projector keeps the host-visible control set in step with the endpoint
 * registry: an on/off control for every classified endpoint, plus a dim
 * control for dimmers, and nothing else. All operations are idempotent
 * ensure-present / ensure-absent.
 */
use std::sync::Arc;

use tracing::{debug, info, warn};

use muxnode_core::types::EndpointId;
use muxnode_devices::controls::{ControlCatalog, ControlId, ControlSurface, Result};
use muxnode_devices::endpoint::EndpointKind;
use muxnode_devices::registry::EndpointRegistry;

/// Projects endpoint classifications onto host-visible controls
#[derive(Debug)]
pub struct CapabilityProjector {
    /// The control surface being managed
    surface: Arc<dyn ControlSurface>,
    /// The static catalog bounding the orphan sweep
    catalog: ControlCatalog,
}

impl CapabilityProjector {
    /// Create a projector over the given surface
    pub fn new(surface: Arc<dyn ControlSurface>, catalog: ControlCatalog) -> Self {
        Self { surface, catalog }
    }

    /// Get the managed control surface
    pub fn surface(&self) -> &Arc<dyn ControlSurface> {
        &self.surface
    }

    /// Get the control catalog
    pub fn catalog(&self) -> &ControlCatalog {
        &self.catalog
    }

    /// Ensure the control set for a classified endpoint exists
    pub async fn project(&self, endpoint: EndpointId, kind: EndpointKind) -> Result<()> {
        self.surface.ensure(ControlId::onoff(endpoint)).await?;
        if kind == EndpointKind::Dimmer {
            self.surface.ensure(ControlId::dim(endpoint)).await?;
        }
        Ok(())
    }

    /// Ensure no control for an endpoint exists.
    ///
    /// Used for unclassified, vanished, and demoted endpoints alike.
    pub async fn unproject(&self, endpoint: EndpointId) -> Result<()> {
        self.surface.remove(&ControlId::onoff(endpoint)).await?;
        self.surface.remove(&ControlId::dim(endpoint)).await?;
        Ok(())
    }

    /// Remove controls for every catalog endpoint without a classification.
    ///
    /// Guarantees no stale control survives a device replacement or a
    /// firmware change that reduced the endpoint count. Returns the number
    /// of endpoints whose controls were removed.
    pub async fn sweep_orphans(&self, registry: &EndpointRegistry) -> usize {
        let mut swept = 0;
        for endpoint in self.catalog.endpoint_ids() {
            if registry.is_classified(endpoint).await {
                continue;
            }
            let had_controls = self.surface.contains(&ControlId::onoff(endpoint)).await
                || self.surface.contains(&ControlId::dim(endpoint)).await;
            if !had_controls {
                continue;
            }
            debug!("Sweeping orphaned controls for endpoint {}", endpoint);
            match self.unproject(endpoint).await {
                Ok(()) => swept += 1,
                Err(e) => warn!("Failed to sweep controls for endpoint {}: {}", endpoint, e),
            }
        }
        if swept > 0 {
            info!("Orphan sweep removed controls for {} endpoints", swept);
        }
        swept
    }
}
