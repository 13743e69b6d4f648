//! `senseboard-rooms` — the in-memory room store.
//!
//! Owns every `RoomState`, tracks which websocket sessions belong to which
//! room, applies client messages under the per-room lock, and fans full
//! snapshots out to all connected sessions. This is the single mutation
//! funnel of the server: the transport dispatcher, the AI scheduler workers,
//! and the transcript path all go through [`store::RoomStore`].

pub mod apply;
pub mod store;
pub mod types;

pub use store::{AiPatchMeta, PatchApplied, RoomStore, SessionHandle};
pub use types::{
    ChatKind, ChatMessage, ContextItem, DiagramGroup, Member, PersonalBoard, RoomAiConfig,
    RoomState, TranscriptChunk,
};
