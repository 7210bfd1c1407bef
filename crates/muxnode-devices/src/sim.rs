/*!
 * Simulated multi-channel node for MuxNode.
 *
 * An in-process `ProtocolAdapter` implementation used by tests, examples and
 * development setups. It models the behaviors that matter to the engine: a
 * mutable topology, per-endpoint levels, root (endpoint-less) reports emitted
 * on local actions, scriptable one-shot failures, and a timestamped command
 * log for ordering and spacing assertions.
 */
use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use muxnode_core::types::{EndpointId, Value};

use crate::adapter::{AdapterError, ProtocolAdapter, Report, ReportEvent, Result};
use crate::endpoint::{classify, CommandClass, EndpointDescriptor, EndpointKind, GenericClass, Topology};

/// A SET command the simulated node received
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// The target endpoint
    pub endpoint: EndpointId,
    /// The command class of the SET
    pub command_class: CommandClass,
    /// The value carried by the SET
    pub value: Value,
    /// When the node received the command
    pub at: Instant,
}

/// Simulated multi-channel node
#[derive(Debug)]
pub struct SimulatedNode {
    /// The endpoints the node currently exposes
    topology: RwLock<Topology>,
    /// Current level per endpoint: 0..=99 for dimmers, 0 or 255 for switches
    levels: RwLock<BTreeMap<EndpointId, i64>>,
    /// Last nonzero dimmer level, restored when a dimmer is switched back on
    restore_levels: RwLock<BTreeMap<EndpointId, i64>>,
    /// Unsolicited report channel
    report_tx: broadcast::Sender<ReportEvent>,
    /// Every SET the node received, in arrival order
    command_log: Mutex<Vec<CommandRecord>>,
    /// Every GET the node received, in arrival order
    get_log: Mutex<Vec<(EndpointId, CommandClass)>>,
    /// One-shot scripted failures for the next GET per endpoint
    scripted_get_failures: Mutex<BTreeMap<EndpointId, AdapterError>>,
}

impl SimulatedNode {
    /// Create a node with no endpoints
    pub fn new() -> Self {
        let (report_tx, _) = broadcast::channel(100);
        Self {
            topology: RwLock::new(Topology::new()),
            levels: RwLock::new(BTreeMap::new()),
            restore_levels: RwLock::new(BTreeMap::new()),
            report_tx,
            command_log: Mutex::new(Vec::new()),
            get_log: Mutex::new(Vec::new()),
            scripted_get_failures: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a dimmer endpoint at the given level (clamped to 0..=99)
    pub async fn add_dimmer(&self, endpoint: EndpointId, level: i64) {
        let level = level.clamp(0, 99);
        self.topology.write().await.insert(
            endpoint,
            EndpointDescriptor::new(
                GenericClass::MultilevelSwitch,
                [CommandClass::SwitchMultilevel, CommandClass::Basic],
            ),
        );
        self.levels.write().await.insert(endpoint, level);
        if level > 0 {
            self.restore_levels.write().await.insert(endpoint, level);
        }
    }

    /// Add a binary switch endpoint
    pub async fn add_switch(&self, endpoint: EndpointId, on: bool) {
        self.topology.write().await.insert(
            endpoint,
            EndpointDescriptor::new(GenericClass::BinarySwitch, [CommandClass::SwitchBinary]),
        );
        self.levels
            .write()
            .await
            .insert(endpoint, if on { 255 } else { 0 });
    }

    /// Add an endpoint the engine cannot classify
    pub async fn add_unsupported(&self, endpoint: EndpointId) {
        self.topology.write().await.insert(
            endpoint,
            EndpointDescriptor::new(GenericClass::Sensor, [CommandClass::Meter]),
        );
    }

    /// Remove an endpoint from the topology
    pub async fn remove_endpoint(&self, endpoint: EndpointId) {
        self.topology.write().await.remove(&endpoint);
        self.levels.write().await.remove(&endpoint);
        self.restore_levels.write().await.remove(&endpoint);
    }

    /// Remove every endpoint
    pub async fn clear_topology(&self) {
        self.topology.write().await.clear();
        self.levels.write().await.clear();
        self.restore_levels.write().await.clear();
    }

    /// Get the current level of an endpoint
    pub async fn level(&self, endpoint: EndpointId) -> Option<i64> {
        self.levels.read().await.get(&endpoint).copied()
    }

    /// Simulate a local (non-host) action: set the endpoint's level and emit
    /// a root report that does not say which endpoint changed.
    pub async fn local_action(&self, endpoint: EndpointId, level: i64) {
        let descriptor = match self.topology.read().await.get(&endpoint).cloned() {
            Some(descriptor) => descriptor,
            None => return,
        };
        let Some(kind) = classify(&descriptor) else {
            return;
        };
        let level = match kind {
            EndpointKind::Dimmer => level.clamp(0, 99),
            EndpointKind::Switch => {
                if level > 0 {
                    255
                } else {
                    0
                }
            }
        };
        self.levels.write().await.insert(endpoint, level);
        if kind == EndpointKind::Dimmer && level > 0 {
            self.restore_levels.write().await.insert(endpoint, level);
        }

        debug!("Local action on endpoint {}: level {}", endpoint, level);
        self.emit_report(
            kind.command_class(),
            None,
            Report::new().with_field("value", level),
        );
    }

    /// Emit an unsolicited report
    pub fn emit_report(
        &self,
        command_class: CommandClass,
        endpoint: Option<EndpointId>,
        report: Report,
    ) {
        let _ = self.report_tx.send(ReportEvent {
            command_class,
            endpoint,
            report,
        });
    }

    /// Make the next GET for an endpoint fail with the given error
    pub async fn fail_next_get(&self, endpoint: EndpointId, error: AdapterError) {
        self.scripted_get_failures.lock().await.insert(endpoint, error);
    }

    /// Get every SET received so far, in arrival order
    pub async fn command_log(&self) -> Vec<CommandRecord> {
        self.command_log.lock().await.clone()
    }

    /// Clear the command log
    pub async fn clear_command_log(&self) {
        self.command_log.lock().await.clear();
    }

    /// Count the GETs received for an endpoint
    pub async fn get_count(&self, endpoint: EndpointId) -> usize {
        self.get_log
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == endpoint)
            .count()
    }

    /// Clear the GET log
    pub async fn clear_get_log(&self) {
        self.get_log.lock().await.clear();
    }

    async fn descriptor(&self, endpoint: EndpointId) -> Result<EndpointDescriptor> {
        self.topology
            .read()
            .await
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| {
                AdapterError::configuration(format!("endpoint {} has no descriptor", endpoint))
            })
    }

    fn check_support(
        descriptor: &EndpointDescriptor,
        endpoint: EndpointId,
        command_class: CommandClass,
    ) -> Result<()> {
        if descriptor.supports(command_class) {
            Ok(())
        } else {
            Err(AdapterError::protocol(format!(
                "endpoint {} does not support {}",
                endpoint, command_class
            )))
        }
    }
}

impl Default for SimulatedNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for SimulatedNode {
    async fn topology(&self) -> Result<Topology> {
        Ok(self.topology.read().await.clone())
    }

    async fn get(&self, endpoint: EndpointId, command_class: CommandClass) -> Result<Report> {
        self.get_log.lock().await.push((endpoint, command_class));

        if let Some(error) = self.scripted_get_failures.lock().await.remove(&endpoint) {
            return Err(error);
        }

        let descriptor = self.descriptor(endpoint).await?;
        Self::check_support(&descriptor, endpoint, command_class)?;

        let level = self
            .levels
            .read()
            .await
            .get(&endpoint)
            .copied()
            .unwrap_or(0);
        Ok(Report::new().with_field("value", level))
    }

    async fn set(
        &self,
        endpoint: EndpointId,
        command_class: CommandClass,
        value: Value,
    ) -> Result<()> {
        self.command_log.lock().await.push(CommandRecord {
            endpoint,
            command_class,
            value: value.clone(),
            at: Instant::now(),
        });

        let descriptor = self.descriptor(endpoint).await?;
        Self::check_support(&descriptor, endpoint, command_class)?;

        let level = match command_class {
            CommandClass::SwitchMultilevel => match &value {
                Value::Bool(true) => self
                    .restore_levels
                    .read()
                    .await
                    .get(&endpoint)
                    .copied()
                    .unwrap_or(99),
                Value::Bool(false) => 0,
                Value::Integer(n) => {
                    let level = (*n).clamp(0, 99);
                    if level > 0 {
                        self.restore_levels.write().await.insert(endpoint, level);
                    }
                    level
                }
                other => {
                    return Err(AdapterError::protocol(format!(
                        "invalid multilevel value: {}",
                        other
                    )));
                }
            },
            CommandClass::SwitchBinary => {
                let on = match &value {
                    Value::Bool(b) => *b,
                    Value::Integer(n) => *n > 0,
                    other => {
                        return Err(AdapterError::protocol(format!(
                            "invalid binary value: {}",
                            other
                        )));
                    }
                };
                if on {
                    255
                } else {
                    0
                }
            }
            other => {
                return Err(AdapterError::protocol(format!(
                    "SET not supported for {}",
                    other
                )));
            }
        };

        self.levels.write().await.insert(endpoint, level);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.report_tx.subscribe()
    }
}
