//! Scripted in-process transport
//!
//! Sessions carry no traffic. Failures, delays and unexpected session exits
//! can be scripted per portal name, which makes the lifecycle engine testable
//! without sockets.

use super::{ForwardingSession, SessionRequest, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    failures: DashMap<String, String>,
    delays: DashMap<String, Duration>,
    /// Exit senders of open sessions, by portal name
    live: DashMap<String, watch::Sender<Option<String>>>,
    requests: Mutex<Vec<SessionRequest>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session request for `name` fails with `message`
    pub fn fail_for(&self, name: &str, message: &str) {
        self.inner
            .failures
            .insert(name.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, name: &str) {
        self.inner.failures.remove(name);
    }

    /// Session requests for `name` take `delay` before resolving
    pub fn delay_for(&self, name: &str, delay: Duration) {
        self.inner.delays.insert(name.to_string(), delay);
    }

    /// End the live session for `name` as if the remote side dropped it
    pub fn terminate(&self, name: &str, reason: &str) -> bool {
        match self.inner.live.get(name) {
            Some(exit) => exit.send(Some(reason.to_string())).is_ok(),
            None => false,
        }
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.inner
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn opened_count(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn live_count(&self) -> usize {
        self.opened_count() - self.closed_count()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn ForwardingSession>, TransportError> {
        if let Ok(mut requests) = self.inner.requests.lock() {
            requests.push(request.clone());
        }

        let delay = self.inner.delays.get(&request.name).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .inner
            .failures
            .get(&request.name)
            .map(|message| message.clone());
        if let Some(message) = failure {
            return Err(TransportError::Failed(message));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        self.inner.live.insert(request.name.clone(), exit_tx);
        self.inner.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemorySession {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            exit_rx,
            inner: self.inner.clone(),
        }))
    }
}

struct InMemorySession {
    id: String,
    name: String,
    exit_rx: watch::Receiver<Option<String>>,
    inner: Arc<Inner>,
}

#[async_trait]
impl ForwardingSession for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn listen_address(&self) -> Option<String> {
        Some(format!("memory://{}", self.id))
    }

    fn exit_signal(&self) -> watch::Receiver<Option<String>> {
        self.exit_rx.clone()
    }

    async fn close(self: Box<Self>) {
        // Only drop the live entry if it still belongs to this session
        self.inner
            .live
            .remove_if(&self.name, |_, exit| exit.subscribe().same_channel(&self.exit_rx));
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_types::PortalAddress;

    fn request(name: &str) -> SessionRequest {
        SessionRequest {
            name: name.to_string(),
            scheme: None,
            address: PortalAddress::new("localhost", 8080),
        }
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let transport = InMemoryTransport::new();
        let session = transport.open_session(request("web")).await.unwrap();
        assert_eq!(transport.live_count(), 1);

        session.close().await;
        assert_eq!(transport.live_count(), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let transport = InMemoryTransport::new();
        transport.fail_for("web", "relay unreachable");

        match transport.open_session(request("web")).await {
            Err(TransportError::Failed(message)) => assert_eq!(message, "relay unreachable"),
            _ => panic!("expected scripted failure"),
        }
        assert_eq!(transport.opened_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_signals_exit() {
        let transport = InMemoryTransport::new();
        let session = transport.open_session(request("web")).await.unwrap();
        let exit = session.exit_signal();

        assert!(transport.terminate("web", "peer went away"));
        assert_eq!(exit.borrow().as_deref(), Some("peer went away"));
        assert!(!transport.terminate("missing", "n/a"));
    }
}
