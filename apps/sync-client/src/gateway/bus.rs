//! Broadcast hub fanning decoded gateway events out to engine tasks.
//!
//! Uses a single `tokio::sync::broadcast` channel. The engine's apply task
//! subscribes to route events into the stores; a UI layer can subscribe as
//! well to react without polling.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::models::NotificationRecord;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip events (RecvError::Lagged).
const BUS_CAPACITY: usize = 1024;

/// A decoded event from the gateway, plus the two connection-lifecycle
/// signals the stores care about.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The connection (re)entered `Connected`; a full resync should follow.
    Connected,
    /// Reconnect attempts are exhausted; the client is offline until the
    /// next explicit connect.
    Degraded,
    PeerOnline { peer_id: String },
    PeerOffline { peer_id: String },
    Notification(NotificationRecord),
}

/// The engine-wide event bus. Cloneable; hand a clone to anything that
/// publishes or subscribes.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<GatewayEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GatewayEvent>> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: GatewayEvent) {
        // send() returns Err when there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
