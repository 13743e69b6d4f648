use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use senseboard_board::{BoardElement, BoardState};
use senseboard_core::types::MemberId;
use senseboard_protocol::frames::{AiStatus, FocusBox};

// Bounded collections — older entries are truncated from the head.
pub const CHAT_CAP: usize = 300;
pub const CONTEXT_CAP: usize = 200;
pub const TRANSCRIPT_CAP: usize = 400;
pub const AI_HISTORY_CAP: usize = 50;
pub const ARCHIVED_GROUPS_CAP: usize = 20;

/// A participant currently connected to the room. Multiple browser tabs of
/// the same person share one member entry; `session_count` tracks how many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub joined_at: i64,
    #[serde(skip)]
    pub session_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub text: String,
    pub kind: ChatKind,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunk {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub priority: i32,
    pub created_at: i64,
}

/// Per-room AI behavior toggles, mutated via `aiConfig:update`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAiConfig {
    pub frozen: bool,
    pub focus_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_box: Option<FocusBox>,
    pub pinned_group_ids: Vec<String>,
    pub status: AiStatus,
}

/// A named cluster of AI-created elements — one per generated diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramGroup {
    pub id: String,
    pub title: String,
    pub element_ids: Vec<String>,
    pub pinned: bool,
    pub created_at: i64,
}

/// Archived group together with the element snapshots needed to restore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedGroup {
    pub group: DiagramGroup,
    pub elements: Vec<BoardElement>,
}

/// One applied AI patch, with enough state to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiHistoryEntry {
    pub at: i64,
    pub reason: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Ids that did not exist before this patch.
    pub added_ids: Vec<String>,
    /// Previous versions of elements the patch replaced or deleted.
    pub prior_elements: Vec<BoardElement>,
}

/// AI-maintained canvas private to one member.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBoard {
    pub board: BoardState,
    pub last_ai_patch_at: i64,
    pub last_ai_fingerprint: u64,
}

/// The authoritative state for one room. Serialized wholesale as the
/// `room:snapshot` payload (personal boards excluded — those are fetched
/// per member over HTTP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    pub created_at: i64,
    pub members: Vec<Member>,
    pub transcript: Vec<TranscriptChunk>,
    pub chat: Vec<ChatMessage>,
    pub context: Vec<ContextItem>,
    pub visual_hint: String,
    pub ai: RoomAiConfig,
    pub groups: HashMap<String, DiagramGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_group_id: Option<String>,
    pub archived_groups: Vec<ArchivedGroup>,
    pub ai_history: Vec<AiHistoryEntry>,
    pub last_ai_patch_at: i64,
    pub last_ai_fingerprint: u64,
    pub board: BoardState,
    #[serde(skip)]
    pub personal: HashMap<String, PersonalBoard>,
}

impl RoomState {
    pub fn new(room_id: String, now: i64) -> Self {
        Self {
            room_id,
            created_at: now,
            members: Vec::new(),
            transcript: Vec::new(),
            chat: Vec::new(),
            context: Vec::new(),
            visual_hint: String::new(),
            ai: RoomAiConfig::default(),
            groups: HashMap::new(),
            active_group_id: None,
            archived_groups: Vec::new(),
            ai_history: Vec::new(),
            last_ai_patch_at: 0,
            last_ai_fingerprint: 0,
            board: BoardState::new(),
            personal: HashMap::new(),
        }
    }

    pub fn member_by_key(&self, key: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| senseboard_core::types::name_key(&m.name) == key)
    }

    /// Distinct normalized names of currently connected members.
    pub fn member_name_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .members
            .iter()
            .map(|m| senseboard_core::types::name_key(&m.name))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Truncate a bounded sequence from the head, keeping the newest `cap`.
pub(crate) fn truncate_head<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let overflow = items.len() - cap;
        items.drain(..overflow);
    }
}
