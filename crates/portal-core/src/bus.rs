//! Notification bus for portal changes
//!
//! Backed by `tokio::sync::broadcast`: publishing never blocks and never fails
//! because of slow or missing subscribers. Each subscriber sees the events
//! published after it subscribed, nothing earlier.

use futures::stream::{BoxStream, StreamExt};
use portal_types::PortalEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default number of buffered events per subscriber
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<PortalEvent>,
    events_published: Arc<AtomicU64>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event, returning how many subscribers will see it
    pub fn publish(&self, event: PortalEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Portal event published");
                receivers
            }
            // No subscribers, the event is dropped
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's independent view of the bus
pub struct Subscription {
    receiver: broadcast::Receiver<PortalEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the overwritten events and keeps
    /// receiving.
    pub async fn recv(&mut self) -> Option<PortalEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Portal event subscriber lagged, events dropped");
                }
            }
        }
    }

    /// Next event if one is already buffered
    pub fn try_recv(&mut self) -> Option<PortalEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Boxed so callers can poll it with `StreamExt::next` directly
    pub fn into_stream(self) -> BoxStream<'static, PortalEvent> {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
        .boxed()
    }
}
