use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handshake::{ClientAckPayload, ServerAckPayload};

/// Rectangle the AI should concentrate on when focus mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Room AI status surfaced in snapshots and togglable via `aiConfig:update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiStatus {
    #[default]
    Idle,
    Listening,
    Updating,
    Frozen,
}

/// Client → Server frames.
/// Wire: `{ "type": "chat:add", "payload": { "text": "..." } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    #[serde(rename = "client:ack")]
    ClientAck(ClientAckPayload),
    #[serde(rename = "chat:add")]
    ChatAdd(ChatAddPayload),
    #[serde(rename = "context:add")]
    ContextAdd(ContextAddPayload),
    #[serde(rename = "context:update")]
    ContextUpdate(ContextUpdatePayload),
    #[serde(rename = "context:delete")]
    ContextDelete(ContextDeletePayload),
    #[serde(rename = "transcript:add")]
    TranscriptAdd(TranscriptAddPayload),
    #[serde(rename = "visualHint:set")]
    VisualHintSet(VisualHintSetPayload),
    #[serde(rename = "aiConfig:update")]
    AiConfigUpdate(AiConfigUpdatePayload),
    #[serde(rename = "diagram:pinCurrent")]
    DiagramPinCurrent(EmptyPayload),
    #[serde(rename = "diagram:undoAi")]
    DiagramUndoAi(EmptyPayload),
    #[serde(rename = "diagram:restoreArchived")]
    DiagramRestoreArchived(RestoreArchivedPayload),
    #[serde(rename = "diagram:clearBoard")]
    DiagramClearBoard(EmptyPayload),
}

impl ClientFrame {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ClientFrame::ClientAck(_) => "client:ack",
            ClientFrame::ChatAdd(_) => "chat:add",
            ClientFrame::ContextAdd(_) => "context:add",
            ClientFrame::ContextUpdate(_) => "context:update",
            ClientFrame::ContextDelete(_) => "context:delete",
            ClientFrame::TranscriptAdd(_) => "transcript:add",
            ClientFrame::VisualHintSet(_) => "visualHint:set",
            ClientFrame::AiConfigUpdate(_) => "aiConfig:update",
            ClientFrame::DiagramPinCurrent(_) => "diagram:pinCurrent",
            ClientFrame::DiagramUndoAi(_) => "diagram:undoAi",
            ClientFrame::DiagramRestoreArchived(_) => "diagram:restoreArchived",
            ClientFrame::DiagramClearBoard(_) => "diagram:clearBoard",
        }
    }
}

/// Variants whose payload carries no data still accept `{}` (or nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAddPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAddPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdatePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDeletePayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptAddPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualHintSetPayload {
    pub hint: String,
}

/// Partial update — absent fields keep their current value. The store
/// enforces the frozen⇔status coupling and focus-box clearing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfigUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_box: Option<FocusBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_group_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AiStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreArchivedPayload {
    pub group_id: String,
}

/// Server → Client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    #[serde(rename = "server:ack")]
    ServerAck(ServerAckPayload),
    /// Full room state, serialized by the room store.
    #[serde(rename = "room:snapshot")]
    RoomSnapshot(Value),
    #[serde(rename = "room:error")]
    RoomError(RoomErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomErrorPayload {
    pub message: String,
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::RoomError(RoomErrorPayload {
            message: message.into(),
        })
    }

    /// Serialize for the wire; frames are plain data so this cannot fail in
    /// practice, and a corrupt frame must never take the session down.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"room:error","payload":{"message":"internal serialization failure"}}"#
                .to_string()
        })
    }
}
