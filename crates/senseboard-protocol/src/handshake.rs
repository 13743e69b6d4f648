use serde::{Deserialize, Serialize};

pub use senseboard_core::config::WS_PROTOCOL;

/// Client → Server: first frame on every connection.
/// Sent as: `{ "type": "client:ack", "payload": { "protocol": "senseboard-ws-v1", "sentAt": ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAckPayload {
    pub protocol: String,
    pub sent_at: i64,
}

impl ClientAckPayload {
    pub fn protocol_matches(&self) -> bool {
        self.protocol == WS_PROTOCOL
    }
}

/// Server → Client: handshake confirmation. After this frame the session is
/// attached to the room and will receive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAckPayload {
    pub protocol: String,
    pub room_id: String,
    pub member_id: String,
    pub received_at: i64,
}

impl ServerAckPayload {
    pub fn new(room_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            protocol: WS_PROTOCOL.to_string(),
            room_id: room_id.into(),
            member_id: member_id.into(),
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
