use crate::daemon::rpc::{DaemonRequest, DaemonResponse};
use anyhow::{Context, Result};
use portal_core::{PortalLifecycleManager, PortalSummary};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info};

pub struct RpcServer {
    manager: Arc<PortalLifecycleManager>,
    listener: TcpListener,
    session_timeout: Duration,
    shutdown: Arc<Notify>,
}

impl RpcServer {
    pub async fn bind(
        manager: Arc<PortalLifecycleManager>,
        addr: &str,
        session_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind RPC port {}", addr))?;
        Ok(Self {
            manager,
            listener,
            session_timeout,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Fires once a client has asked the daemon to shut down
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub async fn run(&self) -> Result<()> {
        info!("Daemon RPC server listening on {}", self.local_addr()?);

        loop {
            let (mut socket, _) = self.listener.accept().await?;
            let manager = self.manager.clone();
            let shutdown = self.shutdown.clone();
            let session_timeout = self.session_timeout;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(&mut socket, manager, session_timeout, shutdown).await
                {
                    error!("RPC connection error: {}", e);
                }
            });
        }
    }
}

/// One request per connection; the client half-closes after writing it
async fn handle_connection(
    socket: &mut TcpStream,
    manager: Arc<PortalLifecycleManager>,
    session_timeout: Duration,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let mut buf = Vec::new();
    socket.read_to_end(&mut buf).await?;

    if buf.is_empty() {
        return Ok(());
    }

    let request: DaemonRequest = serde_json::from_slice(&buf)?;
    debug!("Received RPC request: {:?}", request);

    let is_shutdown = matches!(request, DaemonRequest::Shutdown);
    let response = handle_request(&manager, request, session_timeout).await;

    let response_bytes = serde_json::to_vec(&response)?;
    socket.write_all(&response_bytes).await?;
    socket.shutdown().await?;

    if is_shutdown {
        shutdown.notify_one();
    }

    Ok(())
}

pub async fn handle_request(
    manager: &PortalLifecycleManager,
    request: DaemonRequest,
    session_timeout: Duration,
) -> DaemonResponse {
    match request {
        DaemonRequest::CreatePortal {
            name,
            scheme,
            address,
        } => {
            let create = manager.create_portal(&name, scheme.as_deref(), &address);
            match tokio::time::timeout(session_timeout, create).await {
                Ok(Ok(portal)) => DaemonResponse::PortalCreated(portal.summary()),
                Ok(Err(e)) => DaemonResponse::Error(e.to_string()),
                Err(_) => DaemonResponse::Error(format!(
                    "session for portal '{}' is still opening; it will be listed once established",
                    name
                )),
            }
        }
        DaemonRequest::StopPortal { name } => match manager.stop_portal(&name).await {
            Ok(()) => DaemonResponse::Ok,
            Err(e) => DaemonResponse::Error(e.to_string()),
        },
        DaemonRequest::DestroyPortal { name } => match manager.destroy_portal(&name).await {
            Ok(()) => DaemonResponse::Ok,
            Err(e) => DaemonResponse::Error(e.to_string()),
        },
        DaemonRequest::ListPortals => DaemonResponse::Portals(
            manager
                .list_portals()
                .iter()
                .map(PortalSummary::from)
                .collect(),
        ),
        DaemonRequest::Shutdown => {
            info!("Shutdown requested over RPC");
            DaemonResponse::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::DaemonClient;
    use portal_core::transport::InMemoryTransport;
    use portal_core::{MemoryStore, NotificationBus, PortalState};

    fn manager(transport: &InMemoryTransport) -> Arc<PortalLifecycleManager> {
        Arc::new(PortalLifecycleManager::new(
            Arc::new(transport.clone()),
            Arc::new(MemoryStore::new()),
            NotificationBus::new(),
        ))
    }

    fn create(name: &str, address: &str) -> DaemonRequest {
        DaemonRequest::CreatePortal {
            name: name.to_string(),
            scheme: None,
            address: address.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_list_destroy() {
        let transport = InMemoryTransport::new();
        let manager = manager(&transport);
        let timeout = Duration::from_secs(5);

        match handle_request(&manager, create("web", "localhost:8080"), timeout).await {
            DaemonResponse::PortalCreated(summary) => {
                assert_eq!(summary.name, "web");
                assert_eq!(summary.state, PortalState::Active);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match handle_request(&manager, DaemonRequest::ListPortals, timeout).await {
            DaemonResponse::Portals(portals) => assert_eq!(portals.len(), 1),
            other => panic!("unexpected response: {:?}", other),
        }

        let destroy = DaemonRequest::DestroyPortal {
            name: "web".to_string(),
        };
        assert_eq!(
            handle_request(&manager, destroy.clone(), timeout).await,
            DaemonResponse::Ok
        );
        assert_eq!(
            handle_request(&manager, destroy, timeout).await,
            DaemonResponse::Error("portal 'web' not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_input_is_reported() {
        let transport = InMemoryTransport::new();
        let manager = manager(&transport);

        let response = handle_request(
            &manager,
            create("web", "localhost:99999"),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(
            response,
            DaemonResponse::Error("port 99999 is out of range (1-65535)".to_string())
        );
    }

    #[tokio::test]
    async fn test_slow_session_times_out_but_completes() {
        let transport = InMemoryTransport::new();
        transport.delay_for("web", Duration::from_millis(100));
        let manager = manager(&transport);

        let response = handle_request(
            &manager,
            create("web", "localhost:8080"),
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(response, DaemonResponse::Error(ref m) if m.contains("still opening")));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.get_portal("web").unwrap().state.is_active());
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let transport = InMemoryTransport::new();
        let server = RpcServer::bind(manager(&transport), "127.0.0.1:0", Duration::from_secs(5))
            .await
            .unwrap();
        let port = server.local_addr().unwrap().port();
        let shutdown = server.shutdown_signal();
        tokio::spawn(async move { server.run().await });

        let client = DaemonClient::with_port(port);
        let summary = tokio_test::assert_ok!(
            client
                .create_portal("db", Some("postgresql".to_string()), "localhost:5432")
                .await
        );
        assert_eq!(summary.scheme.as_deref(), Some("postgresql"));

        let portals = client.list_portals().await.unwrap();
        assert_eq!(portals.len(), 1);
        assert_eq!(portals[0].address, "localhost:5432");

        tokio_test::assert_err!(client.stop_portal("ghost").await);

        client.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), shutdown.notified())
            .await
            .unwrap();
    }
}
