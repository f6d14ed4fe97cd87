//! TCP relay transport
//!
//! Opens a local listener for each portal and relays every accepted
//! connection to the portal's target address. This is the plain-TCP leg of a
//! tunnel; securing the remote side is left to whatever carries the listener's
//! traffic.

use super::{ForwardingSession, SessionRequest, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Default interface relay listeners bind to
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

pub struct TcpRelayTransport {
    bind_host: String,
}

impl TcpRelayTransport {
    pub fn new(bind_host: impl Into<String>) -> Self {
        Self {
            bind_host: bind_host.into(),
        }
    }
}

impl Default for TcpRelayTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BIND_HOST)
    }
}

#[async_trait]
impl Transport for TcpRelayTransport {
    async fn open_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn ForwardingSession>, TransportError> {
        let target = request.address.to_string();

        // Resolve once up front so an unknown host fails the create call
        let resolved: Vec<SocketAddr> = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| TransportError::Failed(format!("failed to resolve {}: {}", target, e)))?
            .collect();
        if resolved.is_empty() {
            return Err(TransportError::Failed(format!(
                "failed to resolve {}: no addresses found",
                target
            )));
        }

        let listener = TcpListener::bind((self.bind_host.as_str(), 0))
            .await
            .map_err(|e| {
                TransportError::Failed(format!(
                    "failed to open listener on {}: {}",
                    self.bind_host, e
                ))
            })?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Failed(format!("failed to read listener address: {}", e)))?;

        let id = uuid::Uuid::new_v4().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = watch::channel(None);

        info!(
            "Relay for portal {}: {} -> {} (session {})",
            request.name, listen_addr, target, id
        );

        let name = request.name.clone();
        let handle = tokio::spawn(async move {
            let reason = run_relay(listener, resolved, shutdown_rx).await;
            if let Some(reason) = reason {
                error!("Relay for portal {} ended: {}", name, reason);
                let _ = exit_tx.send(Some(reason));
            }
        });

        Ok(Box::new(TcpRelaySession {
            id,
            listen_addr,
            shutdown_tx,
            exit_rx,
            handle,
        }))
    }
}

/// Accept loop. Returns `Some(reason)` only when the relay dies on its own.
///
/// Connection tasks live in a `JoinSet` owned by the loop, so every open
/// connection is aborted when the loop returns.
async fn run_relay(
    listener: TcpListener,
    targets: Vec<SocketAddr>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<String> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        debug!("Relay connection from {}", peer_addr);
                        connections.spawn(forward_connection(stream, targets.clone()));
                    }
                    Err(e) => {
                        debug!("Accept error: {}", e);
                    }
                }
            }
            // Reap finished connections
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return Some("relay session dropped without close".to_string());
                }
                if *shutdown_rx.borrow() {
                    debug!("Aborting {} open relay connections", connections.len());
                    connections.shutdown().await;
                    return None;
                }
            }
        }
    }
}

/// Relay a single connection to the first reachable target address
async fn forward_connection(mut client: TcpStream, targets: Vec<SocketAddr>) {
    let mut upstream = None;
    for target in &targets {
        match TcpStream::connect(target).await {
            Ok(stream) => {
                upstream = Some(stream);
                break;
            }
            Err(e) => debug!("Failed to connect to {}: {}", target, e),
        }
    }

    let Some(mut upstream) = upstream else {
        return;
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        debug!("Relay connection ended: {}", e);
    }
}

struct TcpRelaySession {
    id: String,
    listen_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<Option<String>>,
    handle: JoinHandle<()>,
}

#[async_trait]
impl ForwardingSession for TcpRelaySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn listen_address(&self) -> Option<String> {
        Some(self.listen_addr.to_string())
    }

    fn exit_signal(&self) -> watch::Receiver<Option<String>> {
        self.exit_rx.clone()
    }

    async fn close(self: Box<Self>) {
        let this = *self;
        let _ = this.shutdown_tx.send(true);
        if let Err(e) = this.handle.await {
            debug!("Relay task for session {} ended abnormally: {}", this.id, e);
        }
        info!("Closed relay session {}", this.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_types::PortalAddress;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_relays_traffic_to_target() {
        // Echo server standing in for the local service
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = echo.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let transport = TcpRelayTransport::default();
        let session = transport
            .open_session(SessionRequest {
                name: "echo".to_string(),
                scheme: None,
                address: PortalAddress::new("127.0.0.1", echo_addr.port()),
            })
            .await
            .unwrap();

        let listen = session.listen_address().unwrap();
        let mut client = TcpStream::connect(&listen).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        let exit = session.exit_signal();
        session.close().await;
        assert!(exit.borrow().is_none());
    }

    #[tokio::test]
    async fn test_close_cuts_open_connections() {
        // Echo server that keeps echoing until its peer goes away
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = echo.accept().await.unwrap();
            let mut buf = [0u8; 64];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let transport = TcpRelayTransport::default();
        let session = transport
            .open_session(SessionRequest {
                name: "echo".to_string(),
                scheme: None,
                address: PortalAddress::new("127.0.0.1", echo_addr.port()),
            })
            .await
            .unwrap();

        let mut client = TcpStream::connect(session.listen_address().unwrap())
            .await
            .unwrap();
        client.write_all(b"one").await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"one");

        session.close().await;

        // The relay side of the connection is gone: no more echoes
        let _ = client.write_all(b"two").await;
        let mut buf = [0u8; 3];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("relay connection should be closed, not idle");
        assert!(matches!(read, Ok(0) | Err(_)), "got {:?}", read);
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let transport = TcpRelayTransport::default();
        let result = transport
            .open_session(SessionRequest {
                name: "nowhere".to_string(),
                scheme: Some("http".to_string()),
                address: PortalAddress::new("host.invalid", 80),
            })
            .await;

        match result {
            Err(TransportError::Failed(message)) => {
                assert!(message.starts_with("failed to resolve host.invalid:80"))
            }
            _ => panic!("expected resolution failure"),
        }
    }
}
