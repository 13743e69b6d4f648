//! The process-wide room registry and snapshot fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use senseboard_board::{apply_all, clamp::clamp_to_canvas, BoardElement, BoardOp, Creator};
use senseboard_core::types::{now_ms, MemberId, RoomId, SessionId};
use senseboard_protocol::frames::{AiStatus, ClientFrame, ServerFrame};

use crate::apply::{append_transcript, apply_client_message, MessageOutcome};
use crate::types::{
    truncate_head, AiHistoryEntry, DiagramGroup, Member, PersonalBoard, RoomState, AI_HISTORY_CAP,
};

/// Send-only handle to one websocket session. The connection task owns the
/// receiving end and forwards frames to the socket.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub member_id: MemberId,
    pub member_name: String,
    pub sender: mpsc::Sender<String>,
}

/// Metadata accompanying an AI patch application.
#[derive(Debug, Clone)]
pub struct AiPatchMeta {
    pub reason: String,
    pub provider: String,
    pub confidence: Option<f64>,
    pub topic: Option<String>,
    pub fingerprint: u64,
}

/// Result of applying an AI patch through the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchApplied {
    pub changed: bool,
    pub revision: u64,
    /// Elements relocated by the canvas clamp.
    pub adjusted: usize,
}

/// In-memory map of all rooms plus the per-room session registries.
///
/// Rooms live for the process lifetime. Every mutation path locks the room's
/// own mutex; snapshot serialization happens inside the lock on the live
/// state, sending happens outside it on a cloned sender list.
pub struct RoomStore {
    rooms: DashMap<String, Arc<Mutex<RoomState>>>,
    sessions: DashMap<String, Vec<SessionHandle>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Normalize the id and create the room if it does not exist yet.
    pub fn get_or_create(&self, raw_id: &str) -> RoomId {
        let id = RoomId::normalize(raw_id);
        self.rooms.entry(id.as_str().to_string()).or_insert_with(|| {
            info!(room = %id, "room created");
            Arc::new(Mutex::new(RoomState::new(id.as_str().to_string(), now_ms())))
        });
        id
    }

    pub fn exists(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id.as_str())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Run `f` under the room's lock. Returns `None` for unknown rooms.
    pub fn with_room<R>(&self, id: &RoomId, f: impl FnOnce(&mut RoomState) -> R) -> Option<R> {
        let room = self.rooms.get(id.as_str()).map(|r| Arc::clone(r.value()))?;
        let mut guard = room.lock().unwrap();
        Some(f(&mut guard))
    }

    /// Serialized snapshot of the room, or `None` if it does not exist.
    pub fn snapshot(&self, id: &RoomId) -> Option<serde_json::Value> {
        self.with_room(id, |room| serde_json::to_value(&*room).ok())?
    }

    // --- membership --------------------------------------------------------

    /// Register a session and idempotently add its member to the room.
    /// Returns the (possibly pre-existing) member id and broadcasts.
    pub fn attach(
        &self,
        id: &RoomId,
        session_id: SessionId,
        member_name: &str,
        sender: mpsc::Sender<String>,
    ) -> Option<MemberId> {
        let key = senseboard_core::types::name_key(member_name);
        let member_id = self.with_room(id, |room| {
            if let Some(member) = room
                .members
                .iter_mut()
                .find(|m| senseboard_core::types::name_key(&m.name) == key)
            {
                member.session_count += 1;
                member.member_id.clone()
            } else {
                let member_id = MemberId::new();
                room.members.push(Member {
                    member_id: member_id.clone(),
                    name: member_name.trim().to_string(),
                    joined_at: now_ms(),
                    session_count: 1,
                });
                member_id
            }
        })?;

        self.sessions
            .entry(id.as_str().to_string())
            .or_default()
            .push(SessionHandle {
                session_id,
                member_id: member_id.clone(),
                member_name: member_name.trim().to_string(),
                sender,
            });

        debug!(room = %id, member = %member_name, "session attached");
        self.broadcast(id);
        Some(member_id)
    }

    /// Drop a session; the member leaves the room when its last session
    /// closes. Broadcasts the updated membership.
    pub fn detach(&self, id: &RoomId, session_id: &SessionId) {
        let mut removed_name: Option<String> = None;
        if let Some(mut entry) = self.sessions.get_mut(id.as_str()) {
            if let Some(pos) = entry.iter().position(|s| &s.session_id == session_id) {
                removed_name = Some(entry.remove(pos).member_name);
            }
        }
        let Some(name) = removed_name else {
            return;
        };

        let key = senseboard_core::types::name_key(&name);
        let _ = self.with_room(id, |room| {
            if let Some(pos) = room
                .members
                .iter()
                .position(|m| senseboard_core::types::name_key(&m.name) == key)
            {
                let member = &mut room.members[pos];
                member.session_count = member.session_count.saturating_sub(1);
                if member.session_count == 0 {
                    room.members.remove(pos);
                }
            }
        });
        debug!(room = %id, member = %name, "session detached");
        self.broadcast(id);
    }

    // --- message + transcript application ----------------------------------

    /// Dispatch a client frame under the room lock; broadcast on mutation.
    pub fn apply_message(
        &self,
        id: &RoomId,
        sender_name: &str,
        frame: ClientFrame,
    ) -> Option<MessageOutcome> {
        let outcome =
            self.with_room(id, |room| apply_client_message(room, sender_name, frame, now_ms()))?;
        if outcome.mutated {
            self.broadcast(id);
        }
        Some(outcome)
    }

    /// Append a transcript chunk from the HTTP transcription path.
    pub fn add_transcript(
        &self,
        id: &RoomId,
        speaker: Option<&str>,
        text: &str,
    ) -> Option<MessageOutcome> {
        let outcome = self.with_room(id, |room| append_transcript(room, speaker, text, now_ms()))?;
        if outcome.mutated {
            self.broadcast(id);
        }
        Some(outcome)
    }

    // --- AI patch application ----------------------------------------------

    /// Apply engine output to the shared board: reduce, clamp, record undo
    /// history, refresh the active diagram group, stamp the fingerprint.
    pub fn apply_ai_patch(
        &self,
        id: &RoomId,
        ops: Vec<BoardOp>,
        meta: AiPatchMeta,
    ) -> Option<PatchApplied> {
        self.with_room(id, |room| {
            let now = now_ms();
            let affected = collect_op_ids(&ops);
            let prior: Vec<BoardElement> = affected
                .iter()
                .filter_map(|op_id| room.board.get(op_id).cloned())
                .collect();
            let existing_before: Vec<String> =
                prior.iter().map(|el| el.id().to_string()).collect();

            let applied = apply_all(&mut room.board, ops, now);
            let adjusted = clamp_to_canvas(&mut room.board, now);

            if applied.changed {
                let added_ids: Vec<String> = affected
                    .iter()
                    .filter(|op_id| {
                        !existing_before.contains(op_id)
                            && room
                                .board
                                .get(op_id)
                                .is_some_and(|el| el.common().created_by == Creator::Ai)
                    })
                    .cloned()
                    .collect();
                room.ai_history.push(AiHistoryEntry {
                    at: now,
                    reason: meta.reason.clone(),
                    provider: meta.provider.clone(),
                    confidence: meta.confidence,
                    added_ids,
                    prior_elements: prior,
                });
                truncate_head(&mut room.ai_history, AI_HISTORY_CAP);

                refresh_active_group(room, meta.topic.as_deref(), now);
                room.last_ai_patch_at = now;
                room.last_ai_fingerprint = meta.fingerprint;
            }

            PatchApplied {
                changed: applied.changed,
                revision: room.board.revision,
                adjusted,
            }
        })
    }

    /// Same as [`Self::apply_ai_patch`] against one member's personal board.
    /// Personal boards keep no undo history and no diagram groups.
    pub fn apply_personal_ai_patch(
        &self,
        id: &RoomId,
        name_key: &str,
        ops: Vec<BoardOp>,
        fingerprint: u64,
    ) -> Option<PatchApplied> {
        self.with_room(id, |room| {
            let now = now_ms();
            let personal = room
                .personal
                .entry(name_key.to_string())
                .or_insert_with(PersonalBoard::default);
            let applied = apply_all(&mut personal.board, ops, now);
            let adjusted = clamp_to_canvas(&mut personal.board, now);
            if applied.changed {
                personal.last_ai_patch_at = now;
                personal.last_ai_fingerprint = fingerprint;
            }
            PatchApplied {
                changed: applied.changed,
                revision: personal.board.revision,
                adjusted,
            }
        })
    }

    pub fn set_ai_status(&self, id: &RoomId, status: AiStatus) {
        let _ = self.with_room(id, |room| {
            if room.ai.frozen && status != AiStatus::Frozen {
                return;
            }
            room.ai.status = status;
        });
    }

    // --- fan-out ------------------------------------------------------------

    /// Serialize the room once and write the snapshot frame to every open
    /// session. A failed send never aborts the loop. No-op for unknown rooms.
    pub fn broadcast(&self, id: &RoomId) {
        let Some(Some(snapshot)) =
            self.with_room(id, |room| serde_json::to_value(&*room).ok())
        else {
            return;
        };
        let frame = ServerFrame::RoomSnapshot(snapshot).to_json();

        let handles: Vec<SessionHandle> = self
            .sessions
            .get(id.as_str())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for handle in handles {
            if let Err(e) = handle.sender.try_send(frame.clone()) {
                warn!(room = %id, session = %handle.session_id, error = %e,
                    "snapshot send failed, client lagging or gone");
            }
        }
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Every element id an op list touches, in first-seen order.
fn collect_op_ids(ops: &[BoardOp]) -> Vec<String> {
    let mut ids = Vec::new();
    fn push(ids: &mut Vec<String>, id: &str) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    fn walk(ids: &mut Vec<String>, op: &BoardOp) {
        match op {
            BoardOp::UpsertElement { element } => push(ids, element.id()),
            BoardOp::DeleteElement { id }
            | BoardOp::AppendStrokePoints { id, .. }
            | BoardOp::OffsetElement { id, .. }
            | BoardOp::SetElementGeometry { id, .. }
            | BoardOp::SetElementStyle { id, .. }
            | BoardOp::SetElementText { id, .. }
            | BoardOp::SetElementZIndex { id, .. } => push(ids, id),
            BoardOp::DuplicateElement { id, new_id, .. } => {
                push(ids, id);
                push(ids, new_id);
            }
            BoardOp::AlignElements { ids: targets, .. }
            | BoardOp::DistributeElements { ids: targets, .. } => {
                for id in targets {
                    push(ids, id);
                }
            }
            BoardOp::ClearBoard | BoardOp::SetViewport { .. } => {}
            BoardOp::Batch { ops } => {
                for inner in ops {
                    walk(ids, inner);
                }
            }
        }
    }
    for op in ops {
        walk(&mut ids, op);
    }
    ids
}

/// Point the active diagram group at the current set of AI elements,
/// creating the group on first patch.
fn refresh_active_group(room: &mut RoomState, topic: Option<&str>, now: i64) {
    let element_ids = room.board.ai_element_ids();
    let title = topic.unwrap_or("Board").to_string();
    match room
        .active_group_id
        .clone()
        .and_then(|gid| room.groups.get_mut(&gid))
    {
        Some(group) => {
            group.element_ids = element_ids;
            if topic.is_some() {
                group.title = title;
            }
        }
        None => {
            let gid = format!("grp-{}", &Uuid::new_v4().to_string()[..8]);
            room.groups.insert(
                gid.clone(),
                DiagramGroup {
                    id: gid.clone(),
                    title,
                    element_ids,
                    pinned: false,
                    created_at: now,
                },
            );
            room.active_group_id = Some(gid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senseboard_board::{ElementCommon, ShapeElement};
    use senseboard_protocol::frames::{ChatAddPayload, ClientFrame};

    fn ai_rect(id: &str) -> BoardElement {
        BoardElement::Rect(ShapeElement {
            common: ElementCommon {
                id: id.to_string(),
                style: None,
                z: None,
                created_at: 0,
                created_by: Creator::Ai,
            },
            x: 300.0,
            y: 300.0,
            width: 160.0,
            height: 72.0,
            text: Some(id.to_uppercase()),
        })
    }

    fn meta(fingerprint: u64) -> AiPatchMeta {
        AiPatchMeta {
            reason: "tick".into(),
            provider: "deterministic".into(),
            confidence: Some(1.0),
            topic: Some("Tree".into()),
            fingerprint,
        }
    }

    #[test]
    fn get_or_create_normalizes_and_is_idempotent() {
        let store = RoomStore::new();
        let a = store.get_or_create(" room-1 ");
        let b = store.get_or_create("ROOM-1");
        assert_eq!(a, b);
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn snapshot_of_fresh_room_has_empty_board_and_members() {
        let store = RoomStore::new();
        let id = store.get_or_create("R9");
        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap["board"]["order"], serde_json::json!([]));
        assert_eq!(snap["members"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn attach_detach_tracks_member_sessions() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        let (tx, _rx1) = mpsc::channel(8);
        let s1 = SessionId::new();
        let m1 = store.attach(&id, s1.clone(), "Alex", tx).unwrap();

        let (tx2, _rx2) = mpsc::channel(8);
        let s2 = SessionId::new();
        let m2 = store.attach(&id, s2.clone(), "alex", tx2).unwrap();
        // same person in two tabs shares the member entry
        assert_eq!(m1, m2);
        store.with_room(&id, |room| {
            assert_eq!(room.members.len(), 1);
            assert_eq!(room.members[0].session_count, 2);
        }).unwrap();

        store.detach(&id, &s1);
        store.with_room(&id, |room| assert_eq!(room.members.len(), 1)).unwrap();
        store.detach(&id, &s2);
        store.with_room(&id, |room| assert!(room.members.is_empty())).unwrap();
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let _ = store.attach(&id, SessionId::new(), "Alex", tx1);
        let _ = store.attach(&id, SessionId::new(), "Sam", tx2);

        // drain the attach-time snapshots
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        let _ = store.apply_message(
            &id,
            "Alex",
            ClientFrame::ChatAdd(ChatAddPayload {
                text: "draw the cache".into(),
            }),
        );

        let f1 = rx1.try_recv().unwrap();
        let f2 = rx2.try_recv().unwrap();
        assert!(f1.contains(r#""type":"room:snapshot""#));
        assert!(f2.contains("draw the cache"));
    }

    #[tokio::test]
    async fn snapshots_carry_increasing_revisions() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        let (tx, mut rx) = mpsc::channel(32);
        let _ = store.attach(&id, SessionId::new(), "Alex", tx);
        while rx.try_recv().is_ok() {}

        let _ = store.apply_ai_patch(
            &id,
            vec![BoardOp::UpsertElement {
                element: ai_rect("n1"),
            }],
            meta(1),
        );
        store.broadcast(&id);
        let _ = store.apply_ai_patch(
            &id,
            vec![BoardOp::UpsertElement {
                element: ai_rect("n2"),
            }],
            meta(2),
        );
        store.broadcast(&id);

        let mut revisions = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            revisions.push(value["payload"]["board"]["revision"].as_u64().unwrap());
        }
        assert!(revisions.windows(2).all(|w| w[0] < w[1]), "{revisions:?}");
    }

    #[test]
    fn ai_patch_records_history_and_group() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        let result = store
            .apply_ai_patch(
                &id,
                vec![
                    BoardOp::UpsertElement {
                        element: ai_rect("n1"),
                    },
                    BoardOp::UpsertElement {
                        element: ai_rect("n2"),
                    },
                ],
                meta(77),
            )
            .unwrap();
        assert!(result.changed);

        store.with_room(&id, |room| {
            assert_eq!(room.last_ai_fingerprint, 77);
            assert!(room.last_ai_patch_at > 0);
            assert_eq!(room.ai_history.len(), 1);
            assert_eq!(room.ai_history[0].added_ids.len(), 2);
            let gid = room.active_group_id.clone().unwrap();
            assert_eq!(room.groups[&gid].element_ids.len(), 2);
            assert_eq!(room.groups[&gid].title, "Tree");
        }).unwrap();
    }

    #[test]
    fn personal_patch_is_isolated_from_shared_board() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        let _ = store.apply_personal_ai_patch(
            &id,
            "alex",
            vec![BoardOp::UpsertElement {
                element: ai_rect("p1"),
            }],
            5,
        );
        store.with_room(&id, |room| {
            assert!(room.board.is_empty());
            let personal = room.personal.get("alex").unwrap();
            assert_eq!(personal.board.len(), 1);
            assert_eq!(personal.last_ai_fingerprint, 5);
        }).unwrap();
    }

    #[test]
    fn set_ai_status_respects_freeze() {
        let store = RoomStore::new();
        let id = store.get_or_create("R1");
        store.with_room(&id, |room| {
            room.ai.frozen = true;
            room.ai.status = AiStatus::Frozen;
        }).unwrap();
        store.set_ai_status(&id, AiStatus::Updating);
        store.with_room(&id, |room| assert_eq!(room.ai.status, AiStatus::Frozen)).unwrap();
    }
}
