/*!
 * Error types for the MuxNode engine crate.
 */
use thiserror::Error;

use muxnode_core::types::EndpointId;
use muxnode_devices::adapter::AdapterError;
use muxnode_devices::controls::SurfaceError;
use muxnode_devices::store::StoreError;

/// Error type for MuxNode engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol adapter error
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Control surface error
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// Node store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] muxnode_core::error::Error),

    /// A referenced control does not exist on the surface
    #[error("Missing control: {0}")]
    MissingControl(String),

    /// A referenced endpoint is not classified in the registry
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),

    /// The endpoint has not completed a successful sync yet
    #[error("State unavailable: {0}")]
    StateUnavailable(String),

    /// The command value does not fit the target control
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Node initialization failed
    #[error("Initialization error: {0}")]
    Init(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for MuxNode engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new missing-control error
    pub fn missing_control<S: AsRef<str>>(msg: S) -> Self {
        Error::MissingControl(msg.as_ref().to_string())
    }

    /// Create a new state-unavailable error
    pub fn state_unavailable<S: AsRef<str>>(msg: S) -> Self {
        Error::StateUnavailable(msg.as_ref().to_string())
    }

    /// Create a new invalid-command error
    pub fn invalid_command<S: AsRef<str>>(msg: S) -> Self {
        Error::InvalidCommand(msg.as_ref().to_string())
    }

    /// Create a new initialization error
    pub fn init<S: AsRef<str>>(msg: S) -> Self {
        Error::Init(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
