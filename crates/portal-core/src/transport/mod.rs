//! Transport layer interfaces
//!
//! The engine never builds tunnels itself. It asks a [`Transport`] for a
//! forwarding session and owns the returned [`ForwardingSession`] for as long
//! as the portal is active.

use crate::error::TransportError;
use async_trait::async_trait;
use portal_types::PortalAddress;
use tokio::sync::watch;

pub mod memory;
pub mod tcp;

pub use memory::InMemoryTransport;
pub use tcp::TcpRelayTransport;

/// What the engine asks the transport to expose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub name: String,
    /// Passed through uninterpreted; `None` means unspecified
    pub scheme: Option<String>,
    pub address: PortalAddress,
}

/// Opens forwarding sessions. May block on external I/O.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn ForwardingSession>, TransportError>;
}

/// A live forwarding session
#[async_trait]
pub trait ForwardingSession: Send + Sync {
    /// Opaque session id assigned by the transport
    fn id(&self) -> &str;

    /// Where traffic for the portal can be reached, if the transport exposes it locally
    fn listen_address(&self) -> Option<String>;

    /// Becomes `Some(reason)` if the session ends without being closed
    fn exit_signal(&self) -> watch::Receiver<Option<String>>;

    /// Tear the session down and release its resources
    async fn close(self: Box<Self>);
}
