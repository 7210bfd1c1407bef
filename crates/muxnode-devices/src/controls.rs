/*!
 * Host-visible controls for MuxNode.
 *
 * Controls are the read/write properties the host projects from classified
 * endpoints: an on/off control for every endpoint, plus a dim control for
 * dimmers. Control ids follow the `<kind>.<endpoint>` convention, e.g.
 * `onoff.3` and `dim.3`.
 */
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use muxnode_core::types::{EndpointId, Value};

/// The kind of a projected control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Boolean on/off control
    OnOff,
    /// Dim level control, a float in [0, 1]
    Dim,
}

impl ControlKind {
    /// Get the id prefix for this control kind
    pub fn prefix(&self) -> &'static str {
        match self {
            ControlKind::OnOff => "onoff",
            ControlKind::Dim => "dim",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Identifier of a projected control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId {
    /// The control kind
    kind: ControlKind,
    /// The endpoint the control belongs to
    endpoint: EndpointId,
}

impl ControlId {
    /// Create a control id
    pub fn new(kind: ControlKind, endpoint: EndpointId) -> Self {
        Self { kind, endpoint }
    }

    /// The on/off control for an endpoint
    pub fn onoff(endpoint: EndpointId) -> Self {
        Self::new(ControlKind::OnOff, endpoint)
    }

    /// The dim control for an endpoint
    pub fn dim(endpoint: EndpointId) -> Self {
        Self::new(ControlKind::Dim, endpoint)
    }

    /// Get the control kind
    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Get the endpoint the control belongs to
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.prefix(), self.endpoint)
    }
}

/// Error parsing a control id from its string form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid control id: {0}")]
pub struct ParseControlIdError(String);

impl FromStr for ControlId {
    type Err = ParseControlIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (prefix, endpoint) = s
            .split_once('.')
            .ok_or_else(|| ParseControlIdError(s.to_string()))?;
        let kind = match prefix {
            "onoff" => ControlKind::OnOff,
            "dim" => ControlKind::Dim,
            _ => return Err(ParseControlIdError(s.to_string())),
        };
        let endpoint = endpoint
            .parse::<EndpointId>()
            .map_err(|_| ParseControlIdError(s.to_string()))?;
        Ok(ControlId::new(kind, endpoint))
    }
}

/// The static catalog of controls a node could ever project.
///
/// Bounded by the configured maximum endpoint count; the orphan sweep walks
/// this catalog to guarantee no stale control outlives its endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ControlCatalog {
    /// Highest endpoint id the catalog accounts for
    max_endpoints: u16,
}

impl ControlCatalog {
    /// Create a catalog covering endpoints `1..=max_endpoints`
    pub fn new(max_endpoints: u16) -> Self {
        Self { max_endpoints }
    }

    /// Get the highest endpoint id the catalog accounts for
    pub fn max_endpoints(&self) -> u16 {
        self.max_endpoints
    }

    /// Check whether an endpoint id is representable in the catalog
    pub fn contains(&self, endpoint: EndpointId) -> bool {
        endpoint.as_u16() >= 1 && endpoint.as_u16() <= self.max_endpoints
    }

    /// Iterate every endpoint id in the catalog, ascending
    pub fn endpoint_ids(&self) -> impl Iterator<Item = EndpointId> {
        (1..=self.max_endpoints).map(EndpointId::new)
    }
}

/// Error type for control surface operations
#[derive(Error, Debug, Clone)]
pub enum SurfaceError {
    /// The control host did not respond in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The control host rejected the operation
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl SurfaceError {
    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        SurfaceError::Timeout(msg.as_ref().to_string())
    }

    /// Create a new rejection error
    pub fn rejected<S: AsRef<str>>(msg: S) -> Self {
        SurfaceError::Rejected(msg.as_ref().to_string())
    }

    /// Check whether this error is the transient timeout kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, SurfaceError::Timeout(_))
    }
}

/// Result type for control surface operations
pub type Result<T> = std::result::Result<T, SurfaceError>;

/// The set of controls currently visible on the host.
///
/// `ensure` and `remove` are idempotent ("ensure present" / "ensure absent");
/// a control's value is `None` until the first synchronized or commanded
/// write.
#[async_trait]
pub trait ControlSurface: Send + Sync + Debug {
    /// Ensure a control exists
    async fn ensure(&self, control: ControlId) -> Result<()>;

    /// Ensure a control is absent
    async fn remove(&self, control: &ControlId) -> Result<()>;

    /// Check whether a control exists
    async fn contains(&self, control: &ControlId) -> bool;

    /// Get the last observed value of a control
    async fn value(&self, control: &ControlId) -> Option<Value>;

    /// Overwrite the value of an existing control
    async fn write(&self, control: &ControlId, value: Value) -> Result<()>;

    /// List every existing control, ascending
    async fn controls(&self) -> Vec<ControlId>;
}

/// In-memory control surface for tests and development
#[derive(Debug, Default)]
pub struct MemoryControlSurface {
    /// Existing controls and their last observed values
    controls: RwLock<BTreeMap<ControlId, Option<Value>>>,
    /// One-shot scripted failure for the next `ensure` call
    fail_next_ensure: Mutex<Option<SurfaceError>>,
}

impl MemoryControlSurface {
    /// Create a new empty surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `ensure` call fail with the given error
    pub fn fail_next_ensure(&self, error: SurfaceError) {
        let mut slot = self
            .fail_next_ensure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(error);
    }

    fn take_scripted_failure(&self) -> Option<SurfaceError> {
        self.fail_next_ensure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl ControlSurface for MemoryControlSurface {
    async fn ensure(&self, control: ControlId) -> Result<()> {
        if let Some(error) = self.take_scripted_failure() {
            return Err(error);
        }
        self.controls.write().await.entry(control).or_insert(None);
        Ok(())
    }

    async fn remove(&self, control: &ControlId) -> Result<()> {
        self.controls.write().await.remove(control);
        Ok(())
    }

    async fn contains(&self, control: &ControlId) -> bool {
        self.controls.read().await.contains_key(control)
    }

    async fn value(&self, control: &ControlId) -> Option<Value> {
        self.controls.read().await.get(control).cloned().flatten()
    }

    async fn write(&self, control: &ControlId, value: Value) -> Result<()> {
        let mut controls = self.controls.write().await;
        match controls.get_mut(control) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(SurfaceError::rejected(format!(
                "control {} does not exist",
                control
            ))),
        }
    }

    async fn controls(&self) -> Vec<ControlId> {
        self.controls.read().await.keys().copied().collect()
    }
}
