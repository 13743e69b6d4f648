use serde::{Deserialize, Serialize};

use senseboard_core::types::RoomId;

/// Why a patch job was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchReason {
    /// Automatic: debounce expiry or periodic attempt. Gated by the signal
    /// check and coalesced in the queue.
    Tick,
    /// Explicit user request (HTTP trigger or UI button).
    Manual,
}

impl std::fmt::Display for PatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchReason::Tick => write!(f, "tick"),
            PatchReason::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub room_id: RoomId,
    pub reason: PatchReason,
    /// Bypass the freeze, the interval gate, and the fingerprint check.
    pub regenerate: bool,
    pub window_seconds: Option<u64>,
    /// Set by callers that know how many chunks triggered them; a tick
    /// without it is coalescible.
    pub transcript_chunk_count: Option<u32>,
}

impl PatchRequest {
    pub fn tick(room_id: RoomId) -> Self {
        Self {
            room_id,
            reason: PatchReason::Tick,
            regenerate: false,
            window_seconds: None,
            transcript_chunk_count: None,
        }
    }

    pub fn manual(room_id: RoomId, regenerate: bool) -> Self {
        Self {
            room_id,
            reason: PatchReason::Manual,
            regenerate,
            window_seconds: None,
            transcript_chunk_count: None,
        }
    }

    /// True when queue rule 1 may coalesce this job with a pending tick.
    pub fn coalescible(&self) -> bool {
        self.reason == PatchReason::Tick
            && !self.regenerate
            && self.transcript_chunk_count.is_none()
    }
}

/// How a job resolved. Suppression reasons are not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl PatchOutcome {
    pub fn applied(revision: u64) -> Self {
        Self {
            applied: true,
            reason: None,
            revision: Some(revision),
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            applied: false,
            reason: Some(reason.to_string()),
            revision: None,
        }
    }
}
