/*!
 * The MuxNode engine.
 *
 * `MuxNode` wires the discovery, synchronization, debouncing, command queue
 * and health pieces around one protocol adapter and exposes the public API:
 * endpoint listings, state queries, queued commands and the transition event
 * stream. Build one with [`MuxNodeBuilder`].
 */
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use muxnode_core::config::EngineConfig;
use muxnode_core::types::{EndpointId, Value};
use muxnode_devices::adapter::ProtocolAdapter;
use muxnode_devices::controls::{
    ControlCatalog, ControlId, ControlKind, ControlSurface, MemoryControlSurface,
};
use muxnode_devices::endpoint::{CommandClass, EndpointKind};
use muxnode_devices::registry::EndpointRegistry;
use muxnode_devices::store::{MemoryStore, NodeStore};

use crate::debounce::ReportDebouncer;
use crate::discovery::{DiscoveryEngine, DiscoverySummary};
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::flow::{CompareOp, EndpointSummary};
use crate::health::HealthMonitor;
use crate::labels::LabelResolver;
use crate::projector::CapabilityProjector;
use crate::queue::{CommandQueue, CommandSink};
use crate::sync::StateSynchronizer;

/// Applies dequeued commands to the device.
///
/// Translates a control write into the endpoint's protocol primitive and, on
/// success, applies the commanded value to the surface immediately instead of
/// waiting for the next report. Turning a dimmer on restores a device-side
/// level the host does not know, so the dim control stays stale until the
/// following sync.
#[derive(Debug)]
struct EngineSink {
    adapter: Arc<dyn ProtocolAdapter>,
    registry: Arc<EndpointRegistry>,
    surface: Arc<dyn ControlSurface>,
    sync: Arc<StateSynchronizer>,
}

fn command_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::invalid_command(format!("expected a boolean, got {:?}", value)))
}

#[async_trait]
impl CommandSink for EngineSink {
    async fn apply(&self, control: ControlId, value: Value) -> Result<()> {
        if !self.surface.contains(&control).await {
            return Err(Error::missing_control(control.to_string()));
        }
        let endpoint = control.endpoint();
        let kind = self
            .registry
            .kind(endpoint)
            .await
            .ok_or(Error::UnknownEndpoint(endpoint))?;

        match (control.kind(), kind) {
            (ControlKind::OnOff, EndpointKind::Dimmer) => {
                let on = command_bool(&value)?;
                self.adapter
                    .set(endpoint, CommandClass::SwitchMultilevel, Value::Bool(on))
                    .await?;
                self.sync
                    .apply_control_value(control, Value::Bool(on))
                    .await;
            }
            (ControlKind::OnOff, EndpointKind::Switch) => {
                let on = command_bool(&value)?;
                self.adapter
                    .set(endpoint, CommandClass::SwitchBinary, Value::Bool(on))
                    .await?;
                self.sync
                    .apply_control_value(control, Value::Bool(on))
                    .await;
            }
            (ControlKind::Dim, EndpointKind::Dimmer) => {
                let level = value.as_float().ok_or_else(|| {
                    Error::invalid_command(format!("expected a dim level, got {:?}", value))
                })?;
                if !(0.0..=1.0).contains(&level) {
                    return Err(Error::invalid_command(format!(
                        "dim level {} outside [0, 1]",
                        level
                    )));
                }
                let raw = (level * 99.0).round() as i64;
                self.adapter
                    .set(endpoint, CommandClass::SwitchMultilevel, Value::Integer(raw))
                    .await?;
                self.sync
                    .apply_control_value(control, Value::Float(level))
                    .await;
                self.sync
                    .apply_control_value(ControlId::onoff(endpoint), Value::Bool(raw > 0))
                    .await;
            }
            (ControlKind::Dim, EndpointKind::Switch) => {
                return Err(Error::invalid_command(format!(
                    "endpoint {} is a switch and cannot be dimmed",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`MuxNode`]
#[derive(Debug)]
pub struct MuxNodeBuilder {
    adapter: Arc<dyn ProtocolAdapter>,
    store: Arc<dyn NodeStore>,
    surface: Arc<dyn ControlSurface>,
    config: EngineConfig,
}

impl MuxNodeBuilder {
    /// Create a builder around a protocol adapter, with an in-memory store
    /// and control surface
    pub fn new(adapter: Arc<dyn ProtocolAdapter>) -> Self {
        Self {
            adapter,
            store: Arc::new(MemoryStore::new()),
            surface: Arc::new(MemoryControlSurface::new()),
            config: EngineConfig::default(),
        }
    }

    /// Use a specific node store
    pub fn with_store(mut self, store: Arc<dyn NodeStore>) -> Self {
        self.store = store;
        self
    }

    /// Use a specific control surface
    pub fn with_surface(mut self, surface: Arc<dyn ControlSurface>) -> Self {
        self.surface = surface;
        self
    }

    /// Use a specific engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Initialize the node.
    ///
    /// Loads the persisted registry, fetches the topology, runs a discovery
    /// pass and an initial sync, then starts the report listener and the
    /// health monitor. An unreachable adapter is the only hard failure; a
    /// broken store degrades to an empty registry with a warning.
    pub async fn init(self) -> Result<MuxNode> {
        let Self {
            adapter,
            store,
            surface,
            config,
        } = self;

        let catalog = ControlCatalog::new(config.max_endpoints);
        let registry = Arc::new(EndpointRegistry::new(store.clone()));
        if let Err(e) = registry.load().await {
            warn!("Failed to load endpoint registry, starting empty: {}", e);
        }

        let snapshot = adapter
            .topology()
            .await
            .map_err(|e| Error::init(format!("failed to fetch topology: {}", e)))?;
        info!("Topology reports {} endpoints", snapshot.len());

        let projector = Arc::new(CapabilityProjector::new(surface.clone(), catalog));
        let labels = Arc::new(LabelResolver::load(store.as_ref(), &catalog).await);
        let (event_tx, _) = broadcast::channel(100);
        let topology = Arc::new(RwLock::new(snapshot.clone()));

        let sync = Arc::new(StateSynchronizer::new(
            adapter.clone(),
            registry.clone(),
            projector.clone(),
            labels.clone(),
            event_tx.clone(),
            topology.clone(),
        ));
        let discovery = Arc::new(DiscoveryEngine::new(registry.clone(), projector.clone()));
        let debouncer = Arc::new(ReportDebouncer::new(sync.clone(), config.quiet_window()));

        discovery.discover_all(&snapshot).await;
        sync.sync_all().await;
        projector.sweep_orphans(&registry).await;

        let sink = Arc::new(EngineSink {
            adapter: adapter.clone(),
            registry: registry.clone(),
            surface: surface.clone(),
            sync: sync.clone(),
        });
        let queue = CommandQueue::new(sink, config.command_spacing());

        let mut tasks = Vec::new();

        let mut reports = adapter.subscribe();
        let listener_sync = sync.clone();
        let listener_debouncer = debouncer.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match reports.recv().await {
                    Ok(event) => match event.endpoint {
                        Some(endpoint) => {
                            listener_sync
                                .apply_report(endpoint, event.command_class, &event.report)
                                .await;
                        }
                        None => match EndpointKind::for_command_class(event.command_class) {
                            Some(kind) => listener_debouncer.note_root_report(kind),
                            None => {
                                debug!("Dropping root report for {}", event.command_class);
                            }
                        },
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Report stream lagged, {} reports dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        let monitor = Arc::new(HealthMonitor::new(
            config.health_interval(),
            registry.clone(),
            surface.clone(),
            adapter.clone(),
            discovery.clone(),
            topology.clone(),
        ));
        tasks.push(monitor.spawn());

        info!("MuxNode initialized");
        Ok(MuxNode {
            adapter,
            registry,
            surface,
            labels,
            sync,
            discovery,
            projector,
            debouncer,
            queue,
            event_tx,
            tasks: Mutex::new(tasks),
        })
    }
}

/// A running engine instance for one multi-channel node
#[derive(Debug)]
pub struct MuxNode {
    adapter: Arc<dyn ProtocolAdapter>,
    registry: Arc<EndpointRegistry>,
    surface: Arc<dyn ControlSurface>,
    labels: Arc<LabelResolver>,
    sync: Arc<StateSynchronizer>,
    discovery: Arc<DiscoveryEngine>,
    projector: Arc<CapabilityProjector>,
    debouncer: Arc<ReportDebouncer>,
    queue: CommandQueue,
    event_tx: broadcast::Sender<EndpointEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MuxNode {
    /// Subscribe to transition events
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.event_tx.subscribe()
    }

    /// List classified endpoints with resolved labels, ascending by id
    pub async fn endpoints(&self, dimmers_only: bool) -> Vec<EndpointSummary> {
        let mut out = Vec::new();
        for (endpoint, entry) in self.registry.snapshot().await {
            let Some(kind) = entry else { continue };
            if dimmers_only && kind != EndpointKind::Dimmer {
                continue;
            }
            out.push(EndpointSummary {
                id: endpoint,
                label: self.labels.resolve(endpoint, Some(kind)),
            });
        }
        out
    }

    /// Get the resolved display name of an endpoint
    pub async fn label(&self, endpoint: EndpointId) -> String {
        let kind = self.registry.kind(endpoint).await;
        self.labels.resolve(endpoint, kind)
    }

    /// Check whether an endpoint is currently on
    pub async fn is_on(&self, endpoint: EndpointId) -> Result<bool> {
        if self.registry.kind(endpoint).await.is_none() {
            return Err(Error::UnknownEndpoint(endpoint));
        }
        match self.surface.value(&ControlId::onoff(endpoint)).await {
            Some(Value::Bool(on)) => Ok(on),
            _ => Err(Error::state_unavailable(format!(
                "endpoint {} has not synced yet",
                endpoint
            ))),
        }
    }

    /// Compare an endpoint's dim level in [0, 1] against a threshold
    pub async fn dim_compare(
        &self,
        endpoint: EndpointId,
        op: CompareOp,
        threshold: f64,
    ) -> Result<bool> {
        match self.registry.kind(endpoint).await {
            Some(EndpointKind::Dimmer) => {}
            Some(EndpointKind::Switch) => {
                return Err(Error::invalid_command(format!(
                    "endpoint {} is a switch and has no dim level",
                    endpoint
                )));
            }
            None => return Err(Error::UnknownEndpoint(endpoint)),
        }
        match self.surface.value(&ControlId::dim(endpoint)).await {
            Some(Value::Float(level)) => Ok(op.evaluate(level, threshold)),
            _ => Err(Error::state_unavailable(format!(
                "endpoint {} has not synced yet",
                endpoint
            ))),
        }
    }

    /// Enqueue a raw control command.
    ///
    /// The command enters the serialized queue immediately; the returned
    /// future resolves with its outcome once the drain reaches it. Validation
    /// happens at apply time, so a command for a missing control fails when
    /// dequeued, not when enqueued.
    pub fn enqueue_command(&self, control: ControlId, value: Value) -> BoxFuture<'static, Result<()>> {
        self.queue.enqueue(control, value)
    }

    /// Queue a turn-on command for an endpoint
    pub fn turn_on(&self, endpoint: EndpointId) -> BoxFuture<'static, Result<()>> {
        self.enqueue_command(ControlId::onoff(endpoint), Value::Bool(true))
    }

    /// Queue a turn-off command for an endpoint
    pub fn turn_off(&self, endpoint: EndpointId) -> BoxFuture<'static, Result<()>> {
        self.enqueue_command(ControlId::onoff(endpoint), Value::Bool(false))
    }

    /// Queue a dim command for an endpoint, level in [0, 1]
    pub fn set_dim(&self, endpoint: EndpointId, level: f64) -> BoxFuture<'static, Result<()>> {
        self.enqueue_command(ControlId::dim(endpoint), Value::Float(level))
    }

    /// Refresh the topology snapshot and sync every classified endpoint.
    ///
    /// A failed topology fetch keeps the previous snapshot and still syncs.
    pub async fn resync(&self) {
        match self.adapter.topology().await {
            Ok(snapshot) => self.sync.set_topology(snapshot).await,
            Err(e) => warn!("Topology refresh failed, syncing with last snapshot: {}", e),
        }
        self.sync.sync_all().await;
    }

    /// Refresh the topology and rerun discovery and the orphan sweep
    pub async fn rediscover(&self) -> Result<DiscoverySummary> {
        let snapshot = self.adapter.topology().await?;
        self.sync.set_topology(snapshot.clone()).await;
        let summary = self.discovery.discover_all(&snapshot).await;
        self.projector.sweep_orphans(&self.registry).await;
        Ok(summary)
    }

    /// Stop background tasks and pending sweeps
    pub fn shutdown(&self) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
        self.debouncer.cancel_all();
    }
}

impl Drop for MuxNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}
