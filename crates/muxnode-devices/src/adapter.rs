/*!
 * Protocol adapter boundary for MuxNode.
 *
 * The adapter is the seam between the engine and the underlying protocol
 * stack. It is assumed reliable at the single-request level but lossy and
 * slow at the network level, so every exchange can fail with a structured
 * error kind that the engine's retry and demotion policy keys off.
 */
use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use muxnode_core::types::{EndpointId, Value};

use crate::endpoint::{CommandClass, Topology};

/// Error type for protocol adapter operations.
///
/// The kinds are structured deliberately: the engine decides between retry
/// and demotion by matching on the variant, never by inspecting messages.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// The exchange timed out; transient, the endpoint may simply be out of range
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The exchange was malformed or rejected by the node
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request itself was invalid (unknown endpoint, missing descriptor)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AdapterError {
    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        AdapterError::Timeout(msg.as_ref().to_string())
    }

    /// Create a new protocol error
    pub fn protocol<S: AsRef<str>>(msg: S) -> Self {
        AdapterError::Protocol(msg.as_ref().to_string())
    }

    /// Create a new configuration error
    pub fn configuration<S: AsRef<str>>(msg: S) -> Self {
        AdapterError::Configuration(msg.as_ref().to_string())
    }

    /// Check whether this error is the transient timeout kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout(_))
    }
}

/// Result type for protocol adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// A structured report returned by a GET or carried by an unsolicited event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Named report fields
    fields: HashMap<String, Value>,
}

impl Report {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the report
    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field by name
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get the conventional "value" field most reports carry
    pub fn value(&self) -> Option<&Value> {
        self.field("value")
    }
}

/// An unsolicited report event from the node.
///
/// `endpoint` is `None` for root reports: the node signals that some endpoint
/// of the given command class changed without saying which one.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    /// The command class the report belongs to
    pub command_class: CommandClass,
    /// The endpoint the report concerns, if the node qualified it
    pub endpoint: Option<EndpointId>,
    /// The report payload
    pub report: Report,
}

/// Protocol adapter trait.
///
/// Implementations expose the node's topology, per-endpoint GET/SET
/// primitives, and a stream of unsolicited reports. The subscription is
/// scoped: dropping the returned receiver unsubscribes, so callers never
/// track listeners by hand.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + Debug {
    /// Get a snapshot of the endpoints the node currently exposes
    async fn topology(&self) -> Result<Topology>;

    /// Issue a GET for a command class on an endpoint
    async fn get(&self, endpoint: EndpointId, command_class: CommandClass) -> Result<Report>;

    /// Issue a SET for a command class on an endpoint
    async fn set(
        &self,
        endpoint: EndpointId,
        command_class: CommandClass,
        value: Value,
    ) -> Result<()>;

    /// Subscribe to unsolicited reports
    fn subscribe(&self) -> broadcast::Receiver<ReportEvent>;
}
