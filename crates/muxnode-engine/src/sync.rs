/*!
 * Per-endpoint state synchronization.
 *
 * A sync issues a GET for the endpoint's primary command class, parses the
 * report, and applies the result to the projected controls. Application is
 * change-gated: a redundant poll writes nothing and fires no events. Failure
 * handling keys off the structured adapter error kind; only a definitive
 * protocol error demotes an endpoint, a timeout never does.
 */
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use muxnode_core::types::{EndpointId, Value};
use muxnode_devices::adapter::{AdapterError, ProtocolAdapter, Report};
use muxnode_devices::controls::{ControlId, ControlKind};
use muxnode_devices::endpoint::{CommandClass, EndpointKind, Topology};
use muxnode_devices::registry::EndpointRegistry;

use crate::events::EndpointEvent;
use crate::labels::LabelResolver;
use crate::projector::CapabilityProjector;

/// Multilevel levels are reported in `0..=99`.
const MAX_LEVEL: i64 = 99;

/// Parse a multilevel report into a level in `0..=99`
fn parse_multilevel_report(report: &Report) -> Result<i64, AdapterError> {
    let value = report
        .value()
        .ok_or_else(|| AdapterError::protocol("multilevel report has no value field"))?;
    let level = value.as_integer().ok_or_else(|| {
        AdapterError::protocol(format!("multilevel report value is not an integer: {:?}", value))
    })?;
    if !(0..=MAX_LEVEL).contains(&level) {
        return Err(AdapterError::protocol(format!(
            "multilevel level {} out of range",
            level
        )));
    }
    Ok(level)
}

/// Parse a binary report into an on/off state
fn parse_binary_report(report: &Report) -> Result<bool, AdapterError> {
    let value = report
        .value()
        .ok_or_else(|| AdapterError::protocol("binary report has no value field"))?;
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Integer(n) => Ok(*n > 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "enabled" => Ok(true),
            "off" | "false" | "disabled" => Ok(false),
            other => Err(AdapterError::protocol(format!(
                "unrecognized binary report token: {}",
                other
            ))),
        },
        other => Err(AdapterError::protocol(format!(
            "binary report value has unusable type: {:?}",
            other
        ))),
    }
}

/// Synchronizes endpoint state from the node into the control surface
#[derive(Debug)]
pub struct StateSynchronizer {
    /// The protocol adapter used for GETs
    adapter: Arc<dyn ProtocolAdapter>,
    /// The persistent endpoint registry
    registry: Arc<EndpointRegistry>,
    /// The projector managing host-visible controls
    projector: Arc<CapabilityProjector>,
    /// Endpoint label resolution for event payloads
    labels: Arc<LabelResolver>,
    /// Transition event channel
    event_tx: broadcast::Sender<EndpointEvent>,
    /// The most recent topology snapshot
    topology: Arc<RwLock<Topology>>,
}

impl StateSynchronizer {
    /// Create a synchronizer
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        registry: Arc<EndpointRegistry>,
        projector: Arc<CapabilityProjector>,
        labels: Arc<LabelResolver>,
        event_tx: broadcast::Sender<EndpointEvent>,
        topology: Arc<RwLock<Topology>>,
    ) -> Self {
        Self {
            adapter,
            registry,
            projector,
            labels,
            event_tx,
            topology,
        }
    }

    /// Replace the cached topology snapshot
    pub async fn set_topology(&self, topology: Topology) {
        *self.topology.write().await = topology;
    }

    /// Sync every classified endpoint, ascending by id
    pub async fn sync_all(&self) {
        for endpoint in self.registry.ids().await {
            if self.registry.is_classified(endpoint).await {
                self.sync_one(endpoint).await;
            }
        }
    }

    /// Sync every classified endpoint of one kind, ascending by id
    pub async fn sync_by_kind(&self, kind: EndpointKind) {
        debug!("Syncing all {:?} endpoints", kind);
        for endpoint in self.registry.ids_of_kind(kind).await {
            self.sync_one(endpoint).await;
        }
    }

    /// Sync a single endpoint.
    ///
    /// Timeouts are logged and skipped; the endpoint stays classified and the
    /// next pass retries. A protocol error or an unparseable report demotes
    /// the endpoint.
    pub async fn sync_one(&self, endpoint: EndpointId) {
        if !self.topology.read().await.contains_key(&endpoint) {
            debug!("Endpoint {} has no descriptor, removing controls", endpoint);
            if let Err(e) = self.projector.unproject(endpoint).await {
                warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
            }
            return;
        }
        let kind = match self.registry.kind(endpoint).await {
            Some(kind) => kind,
            None => return,
        };

        match self.adapter.get(endpoint, kind.command_class()).await {
            Ok(report) => {
                if let Err(e) = self.apply_kind_report(endpoint, kind, &report).await {
                    self.demote(endpoint, &e).await;
                }
            }
            Err(e) if e.is_timeout() => {
                warn!("Sync of endpoint {} timed out, keeping classification: {}", endpoint, e);
            }
            Err(AdapterError::Configuration(msg)) => {
                warn!("Sync of endpoint {} skipped: {}", endpoint, msg);
            }
            Err(e) => {
                self.demote(endpoint, &e).await;
            }
        }
    }

    /// Apply a qualified unsolicited report.
    ///
    /// Fast path for reports the node attributes to a specific endpoint: no
    /// GET round trip, the payload is applied directly. Malformed unsolicited
    /// reports are logged and dropped, never demoted, because spontaneous
    /// traffic is less trustworthy than an answered GET.
    pub async fn apply_report(
        &self,
        endpoint: EndpointId,
        command_class: CommandClass,
        report: &Report,
    ) {
        let kind = match self.registry.kind(endpoint).await {
            Some(kind) => kind,
            None => {
                debug!("Dropping report for unclassified endpoint {}", endpoint);
                return;
            }
        };
        if kind.command_class() != command_class {
            debug!(
                "Dropping {} report for {:?} endpoint {}",
                command_class, kind, endpoint
            );
            return;
        }
        if let Err(e) = self.apply_kind_report(endpoint, kind, report).await {
            warn!("Ignoring malformed report for endpoint {}: {}", endpoint, e);
        }
    }

    /// Parse a report for an endpoint kind and apply it to the controls
    async fn apply_kind_report(
        &self,
        endpoint: EndpointId,
        kind: EndpointKind,
        report: &Report,
    ) -> Result<(), AdapterError> {
        match kind {
            EndpointKind::Dimmer => {
                let level = parse_multilevel_report(report)?;
                self.apply_control_value(
                    ControlId::dim(endpoint),
                    Value::Float(level as f64 / MAX_LEVEL as f64),
                )
                .await;
                self.apply_control_value(ControlId::onoff(endpoint), Value::Bool(level > 0))
                    .await;
            }
            EndpointKind::Switch => {
                let on = parse_binary_report(report)?;
                self.apply_control_value(ControlId::onoff(endpoint), Value::Bool(on))
                    .await;
            }
        }
        Ok(())
    }

    /// Write a value to a control if it differs from the last observed one.
    ///
    /// Returns whether a change was applied. Each applied change publishes
    /// the specific transition event plus the generic state-changed event.
    pub async fn apply_control_value(&self, control: ControlId, value: Value) -> bool {
        let surface = self.projector.surface();
        if surface.value(&control).await.as_ref() == Some(&value) {
            return false;
        }
        if let Err(e) = surface.write(&control, value.clone()).await {
            warn!("Failed to write control {}: {}", control, e);
            return false;
        }

        let endpoint = control.endpoint();
        let kind = self.registry.kind(endpoint).await;
        let label = self.labels.resolve(endpoint, kind);
        debug!("Control {} changed to {:?}", control, value);

        let specific = match (control.kind(), &value) {
            (ControlKind::OnOff, Value::Bool(true)) => {
                Some(EndpointEvent::turned_on(endpoint, label.clone()))
            }
            (ControlKind::OnOff, Value::Bool(false)) => {
                Some(EndpointEvent::turned_off(endpoint, label.clone()))
            }
            (ControlKind::Dim, Value::Float(level)) => {
                Some(EndpointEvent::dim_changed(endpoint, label.clone(), *level))
            }
            _ => None,
        };
        if let Some(event) = specific {
            let _ = self.event_tx.send(event);
        }
        let _ = self
            .event_tx
            .send(EndpointEvent::state_changed(endpoint, label, value));
        true
    }

    /// Demote an endpoint after a definitive protocol failure
    async fn demote(&self, endpoint: EndpointId, reason: &AdapterError) {
        info!("Demoting endpoint {} to unsupported: {}", endpoint, reason);
        self.registry.set_entry(endpoint, None).await;
        if let Err(e) = self.projector.unproject(endpoint).await {
            warn!("Failed to remove controls for endpoint {}: {}", endpoint, e);
        }
        if let Err(e) = self.registry.persist().await {
            warn!("Failed to persist endpoint registry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxnode_devices::controls::{ControlCatalog, ControlSurface, MemoryControlSurface};
    use muxnode_devices::sim::SimulatedNode;
    use muxnode_devices::store::MemoryStore;

    #[test]
    fn test_parse_multilevel_report() {
        let report = Report::new().with_field("value", 50i64);
        assert_eq!(parse_multilevel_report(&report).unwrap(), 50);

        let report = Report::new().with_field("value", 120i64);
        assert!(parse_multilevel_report(&report).is_err());

        let report = Report::new().with_field("value", "bright");
        assert!(parse_multilevel_report(&report).is_err());

        assert!(parse_multilevel_report(&Report::new()).is_err());
    }

    #[test]
    fn test_parse_binary_report() {
        assert!(parse_binary_report(&Report::new().with_field("value", true)).unwrap());
        assert!(!parse_binary_report(&Report::new().with_field("value", 0i64)).unwrap());
        assert!(parse_binary_report(&Report::new().with_field("value", 255i64)).unwrap());
        assert!(parse_binary_report(&Report::new().with_field("value", "ON")).unwrap());
        assert!(!parse_binary_report(&Report::new().with_field("value", "disabled")).unwrap());
        assert!(parse_binary_report(&Report::new().with_field("value", "maybe")).is_err());
        assert!(parse_binary_report(&Report::new().with_field("value", 0.5f64)).is_err());
    }

    struct Fixture {
        node: Arc<SimulatedNode>,
        surface: Arc<MemoryControlSurface>,
        registry: Arc<EndpointRegistry>,
        sync: StateSynchronizer,
        events: broadcast::Receiver<EndpointEvent>,
    }

    async fn fixture(node: Arc<SimulatedNode>) -> Fixture {
        let surface = Arc::new(MemoryControlSurface::new());
        let registry = Arc::new(EndpointRegistry::new(Arc::new(MemoryStore::new())));
        let projector = Arc::new(CapabilityProjector::new(
            surface.clone(),
            ControlCatalog::new(8),
        ));
        let (event_tx, events) = broadcast::channel(100);
        let topology = node.topology().await.unwrap();
        for (&endpoint, descriptor) in &topology {
            if let Some(kind) = muxnode_devices::endpoint::classify(descriptor) {
                registry.set_entry(endpoint, Some(kind)).await;
                projector.project(endpoint, kind).await.unwrap();
            }
        }
        let sync = StateSynchronizer::new(
            node.clone(),
            registry.clone(),
            projector,
            Arc::new(LabelResolver::new()),
            event_tx,
            Arc::new(RwLock::new(topology)),
        );
        Fixture {
            node,
            surface,
            registry,
            sync,
            events,
        }
    }

    fn drain(events: &mut broadcast::Receiver<EndpointEvent>) -> Vec<EndpointEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_sync_applies_dimmer_state() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 50).await;
        let mut f = fixture(node).await;

        f.sync.sync_one(EndpointId::new(1)).await;

        let dim = f.surface.value(&ControlId::dim(EndpointId::new(1))).await;
        match dim {
            Some(Value::Float(level)) => assert!((level - 50.0 / 99.0).abs() < 1e-9),
            other => panic!("unexpected dim value: {:?}", other),
        }
        assert_eq!(
            f.surface.value(&ControlId::onoff(EndpointId::new(1))).await,
            Some(Value::Bool(true))
        );

        let events = drain(&mut f.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, EndpointEvent::DimChanged { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EndpointEvent::TurnedOn { .. })));
    }

    #[tokio::test]
    async fn test_redundant_sync_fires_nothing() {
        let node = Arc::new(SimulatedNode::new());
        node.add_switch(EndpointId::new(2), true).await;
        let mut f = fixture(node).await;

        f.sync.sync_one(EndpointId::new(2)).await;
        assert!(!drain(&mut f.events).is_empty());

        f.sync.sync_one(EndpointId::new(2)).await;
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_classification() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 30).await;
        let f = fixture(node).await;

        f.node
            .fail_next_get(EndpointId::new(1), AdapterError::timeout("out of range"))
            .await;
        f.sync.sync_one(EndpointId::new(1)).await;

        assert!(f.registry.is_classified(EndpointId::new(1)).await);
        // The value stays unknown until a later pass succeeds.
        assert_eq!(f.surface.value(&ControlId::dim(EndpointId::new(1))).await, None);
    }

    #[tokio::test]
    async fn test_protocol_error_demotes() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 30).await;
        let f = fixture(node).await;

        f.node
            .fail_next_get(EndpointId::new(1), AdapterError::protocol("garbled frame"))
            .await;
        f.sync.sync_one(EndpointId::new(1)).await;

        assert_eq!(f.registry.entry(EndpointId::new(1)).await, Some(None));
        assert!(!f.surface.contains(&ControlId::dim(EndpointId::new(1))).await);
        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(1))).await);
    }

    #[tokio::test]
    async fn test_qualified_report_fast_path() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 0).await;
        let mut f = fixture(node).await;
        f.node.clear_get_log().await;

        let report = Report::new().with_field("value", 75i64);
        f.sync
            .apply_report(EndpointId::new(1), CommandClass::SwitchMultilevel, &report)
            .await;

        // Applied without a GET round trip.
        assert_eq!(f.node.get_count(EndpointId::new(1)).await, 0);
        let events = drain(&mut f.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, EndpointEvent::DimChanged { .. })));
    }

    #[tokio::test]
    async fn test_malformed_report_never_demotes() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 0).await;
        let f = fixture(node).await;

        let report = Report::new().with_field("value", "garbage");
        f.sync
            .apply_report(EndpointId::new(1), CommandClass::SwitchMultilevel, &report)
            .await;

        assert!(f.registry.is_classified(EndpointId::new(1)).await);
    }

    #[tokio::test]
    async fn test_mismatched_report_is_dropped() {
        let node = Arc::new(SimulatedNode::new());
        node.add_dimmer(EndpointId::new(1), 0).await;
        let mut f = fixture(node).await;

        let report = Report::new().with_field("value", true);
        f.sync
            .apply_report(EndpointId::new(1), CommandClass::SwitchBinary, &report)
            .await;

        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_sync_without_descriptor_removes_controls() {
        let node = Arc::new(SimulatedNode::new());
        node.add_switch(EndpointId::new(2), false).await;
        let f = fixture(node).await;

        // The endpoint vanished after the snapshot was taken.
        f.sync.set_topology(Topology::new()).await;
        f.sync.sync_one(EndpointId::new(2)).await;

        assert!(!f.surface.contains(&ControlId::onoff(EndpointId::new(2))).await);
    }
}
