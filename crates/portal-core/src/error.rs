//! Error types for the portal engine
//!
//! Every error here is returned as a value to the immediate caller. The
//! `Display` output of the operation-level errors is the message shown to the
//! end user, so it is kept short and free of internal detail.

use portal_types::PortalState;
use thiserror::Error;

/// Syntactic problems with a `host:port` string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidAddress {
    #[error("address required")]
    Empty,

    #[error("address '{0}' must be in host:port form")]
    MissingPort(String),

    #[error("address '{0}' has an empty host")]
    EmptyHost(String),

    #[error("port '{0}' is not a number")]
    InvalidPort(String),

    #[error("port {0} is out of range (1-65535)")]
    PortOutOfRange(String),
}

/// Failure reported by the transport layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Diagnostic text from the transport, surfaced verbatim
    #[error("{0}")]
    Failed(String),

    #[error("transport is closed")]
    Closed,
}

/// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Other(String),
}

/// Registry-level failures
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a portal named '{0}' already exists")]
    NameTaken(String),

    #[error("portal '{0}' not found")]
    NotFound(String),

    #[error("portal '{name}' cannot go from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: PortalState,
        to: PortalState,
    },

    #[error("portal '{name}' is still {state}")]
    StillRunning { name: String, state: PortalState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of `create_portal`
#[derive(Error, Debug)]
pub enum CreateError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("a portal named '{0}' already exists")]
    NameTaken(String),

    /// Transport diagnostic, verbatim
    #[error("{0}")]
    SessionFailed(String),

    #[error("portal engine is shutting down")]
    ShuttingDown,

    #[error("failed to save portal: {0}")]
    Store(#[from] StoreError),
}

impl From<InvalidAddress> for CreateError {
    fn from(e: InvalidAddress) -> Self {
        CreateError::InvalidInput(e.to_string())
    }
}

impl From<TransportError> for CreateError {
    fn from(e: TransportError) -> Self {
        CreateError::SessionFailed(e.to_string())
    }
}

impl From<RegistryError> for CreateError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NameTaken(name) => CreateError::NameTaken(name),
            RegistryError::Store(e) => CreateError::Store(e),
            other => CreateError::SessionFailed(other.to_string()),
        }
    }
}

/// Failures of `stop_portal`
#[derive(Error, Debug)]
pub enum StopError {
    #[error("portal '{0}' not found")]
    NotFound(String),

    #[error("portal '{name}' is {state}")]
    InvalidState { name: String, state: PortalState },

    #[error("failed to save portal: {0}")]
    Store(#[from] StoreError),
}

impl From<RegistryError> for StopError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(name) => StopError::NotFound(name),
            RegistryError::InvalidTransition { name, from, .. } => {
                StopError::InvalidState { name, state: from }
            }
            RegistryError::StillRunning { name, state } => StopError::InvalidState { name, state },
            RegistryError::Store(e) => StopError::Store(e),
            other @ RegistryError::NameTaken(_) => {
                StopError::Store(StoreError::Other(other.to_string()))
            }
        }
    }
}

/// Failures of `destroy_portal`
#[derive(Error, Debug)]
pub enum DestroyError {
    #[error("portal '{0}' not found")]
    NotFound(String),

    #[error("portal '{name}' is {state}")]
    InvalidState { name: String, state: PortalState },

    #[error("failed to save portal: {0}")]
    Store(#[from] StoreError),
}

impl From<StopError> for DestroyError {
    fn from(e: StopError) -> Self {
        match e {
            StopError::NotFound(name) => DestroyError::NotFound(name),
            StopError::InvalidState { name, state } => DestroyError::InvalidState { name, state },
            StopError::Store(e) => DestroyError::Store(e),
        }
    }
}

impl From<RegistryError> for DestroyError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(name) => DestroyError::NotFound(name),
            RegistryError::InvalidTransition { name, from, .. } => {
                DestroyError::InvalidState { name, state: from }
            }
            RegistryError::StillRunning { name, state } => DestroyError::InvalidState { name, state },
            RegistryError::Store(e) => DestroyError::Store(e),
            other @ RegistryError::NameTaken(_) => {
                DestroyError::Store(StoreError::Other(other.to_string()))
            }
        }
    }
}
