//! Gateway opcodes, event names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::NotificationRecord;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_ANNOUNCE: u8 = 2;
pub const OP_SUBSCRIBE: u8 = 3;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message received from the gateway server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    pub op: u8,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message sent to the gateway server.
#[derive(Debug, Clone, Serialize)]
pub struct ClientMessage {
    pub op: u8,
    pub d: Value,
}

impl ClientMessage {
    /// The "I am online" announcement, sent once after every (re)connect.
    pub fn announce(session_id: &str) -> Self {
        Self {
            op: OP_ANNOUNCE,
            d: serde_json::json!({ "session_id": session_id }),
        }
    }

    /// Subscribe to the event types the local stores depend on. Sent after
    /// the announcement on every (re)connect so a replaced connection never
    /// inherits a stale subscription set.
    pub fn subscribe_all() -> Self {
        Self {
            op: OP_SUBSCRIBE,
            d: serde_json::json!({
                "events": [
                    EventName::PEER_ONLINE,
                    EventName::PEER_OFFLINE,
                    EventName::NOTIFICATION_CREATE,
                ]
            }),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            op: OP_HEARTBEAT,
            d: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched by the server.
pub struct EventName;

impl EventName {
    pub const PEER_ONLINE: &'static str = "PEER_ONLINE";
    pub const PEER_OFFLINE: &'static str = "PEER_OFFLINE";
    pub const NOTIFICATION_CREATE: &'static str = "NOTIFICATION_CREATE";
}

#[derive(Debug, Deserialize)]
struct PresencePayload {
    peer_id: String,
}

/// Decode a dispatch into a typed event.
///
/// Returns `Ok(None)` for event names this client does not consume; new
/// server-side event types must never break an older client.
pub fn decode_dispatch(
    name: &str,
    data: Value,
) -> Result<Option<super::bus::GatewayEvent>, serde_json::Error> {
    use super::bus::GatewayEvent;

    let event = match name {
        EventName::PEER_ONLINE => {
            let payload: PresencePayload = serde_json::from_value(data)?;
            Some(GatewayEvent::PeerOnline {
                peer_id: payload.peer_id,
            })
        }
        EventName::PEER_OFFLINE => {
            let payload: PresencePayload = serde_json::from_value(data)?;
            Some(GatewayEvent::PeerOffline {
                peer_id: payload.peer_id,
            })
        }
        EventName::NOTIFICATION_CREATE => {
            let record: NotificationRecord = serde_json::from_value(data)?;
            Some(GatewayEvent::Notification(record))
        }
        _ => None,
    };
    Ok(event)
}
