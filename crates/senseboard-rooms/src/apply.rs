//! Client-message application: the store-level dispatch of inbound
//! `ClientFrame`s onto a locked `RoomState`.
//!
//! Preconditions live here, not in the transport: empty payloads are
//! dropped, context titles get a default, transcript chunks pass the
//! acceptance gate, and aiConfig partial updates keep `frozen` and `status`
//! coupled.

use senseboard_board::{apply as reduce, BoardOp};
use senseboard_core::lexicon::is_acceptable_transcript;
use senseboard_protocol::frames::{AiConfigUpdatePayload, AiStatus, ClientFrame};
use uuid::Uuid;

use crate::types::{
    truncate_head, ArchivedGroup, ChatKind, ChatMessage, ContextItem, DiagramGroup, RoomState,
    TranscriptChunk, ARCHIVED_GROUPS_CAP, CHAT_CAP, CONTEXT_CAP, TRANSCRIPT_CAP,
};

pub const DEFAULT_CONTEXT_TITLE: &str = "Untitled context";

/// What a message application did to the room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOutcome {
    /// The room changed and a snapshot broadcast is due.
    pub mutated: bool,
    /// A transcript chunk was accepted — the debounced AI trigger should fire.
    pub transcript_accepted: bool,
    /// Why the message was dropped, when it was.
    pub reject: Option<&'static str>,
}

impl MessageOutcome {
    fn mutated() -> Self {
        Self {
            mutated: true,
            ..Default::default()
        }
    }

    fn dropped(reason: &'static str) -> Self {
        Self {
            reject: Some(reason),
            ..Default::default()
        }
    }
}

/// Apply one client frame to a locked room. `client:ack` never reaches this
/// function — the transport consumes it during the handshake.
pub fn apply_client_message(
    room: &mut RoomState,
    sender_name: &str,
    frame: ClientFrame,
    now: i64,
) -> MessageOutcome {
    match frame {
        ClientFrame::ClientAck(_) => MessageOutcome::dropped("handshake_frame"),

        ClientFrame::ChatAdd(payload) => {
            let text = payload.text.trim();
            if text.is_empty() {
                return MessageOutcome::dropped("empty_payload");
            }
            room.chat.push(ChatMessage {
                id: Uuid::new_v4().to_string(),
                author: sender_name.to_string(),
                text: text.to_string(),
                kind: ChatKind::User,
                at: now,
            });
            truncate_head(&mut room.chat, CHAT_CAP);
            MessageOutcome::mutated()
        }

        ClientFrame::ContextAdd(payload) => {
            let body = payload.body.trim();
            if body.is_empty() {
                return MessageOutcome::dropped("empty_payload");
            }
            let title = payload
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_CONTEXT_TITLE)
                .to_string();
            room.context.push(ContextItem {
                id: Uuid::new_v4().to_string(),
                title,
                body: body.to_string(),
                pinned: payload.pinned,
                priority: payload.priority,
                created_at: now,
            });
            truncate_head(&mut room.context, CONTEXT_CAP);
            MessageOutcome::mutated()
        }

        ClientFrame::ContextUpdate(payload) => {
            let Some(item) = room.context.iter_mut().find(|c| c.id == payload.id) else {
                return MessageOutcome::dropped("unknown_context");
            };
            if let Some(title) = payload.title {
                let title = title.trim().to_string();
                if !title.is_empty() {
                    item.title = title;
                }
            }
            if let Some(body) = payload.body {
                let body = body.trim().to_string();
                if !body.is_empty() {
                    item.body = body;
                }
            }
            if let Some(pinned) = payload.pinned {
                item.pinned = pinned;
            }
            if let Some(priority) = payload.priority {
                item.priority = priority;
            }
            MessageOutcome::mutated()
        }

        ClientFrame::ContextDelete(payload) => {
            let before = room.context.len();
            room.context.retain(|c| c.id != payload.id);
            if room.context.len() == before {
                return MessageOutcome::dropped("unknown_context");
            }
            MessageOutcome::mutated()
        }

        ClientFrame::TranscriptAdd(payload) => {
            append_transcript(room, payload.speaker.as_deref(), &payload.text, now)
        }

        ClientFrame::VisualHintSet(payload) => {
            let hint = payload.hint.trim();
            if hint.is_empty() {
                return MessageOutcome::dropped("empty_payload");
            }
            room.visual_hint = hint.to_string();
            MessageOutcome::mutated()
        }

        ClientFrame::AiConfigUpdate(payload) => {
            apply_ai_config(room, payload);
            MessageOutcome::mutated()
        }

        ClientFrame::DiagramPinCurrent(_) => pin_current(room),
        ClientFrame::DiagramUndoAi(_) => undo_ai(room, now),
        ClientFrame::DiagramRestoreArchived(payload) => {
            restore_archived(room, &payload.group_id, now)
        }
        ClientFrame::DiagramClearBoard(_) => clear_board(room, now),
    }
}

/// Append a transcript chunk (shared by the ws frame path and the HTTP
/// transcription path). Applies the acceptance gate.
pub fn append_transcript(
    room: &mut RoomState,
    speaker: Option<&str>,
    text: &str,
    now: i64,
) -> MessageOutcome {
    let text = text.trim();
    if text.is_empty() {
        return MessageOutcome::dropped("empty_payload");
    }
    if !is_acceptable_transcript(text) {
        return MessageOutcome::dropped("low_signal");
    }
    room.transcript.push(TranscriptChunk {
        id: Uuid::new_v4().to_string(),
        speaker: speaker
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
        text: text.to_string(),
        at: now,
    });
    truncate_head(&mut room.transcript, TRANSCRIPT_CAP);
    if room.ai.status == AiStatus::Idle {
        room.ai.status = AiStatus::Listening;
    }
    MessageOutcome {
        mutated: true,
        transcript_accepted: true,
        reject: None,
    }
}

/// Partial aiConfig update with the frozen⇔status coupling:
/// `frozen=true` forces `status=frozen`; `status=frozen` forces
/// `frozen=true`; unfreezing resets the status to idle unless a generation
/// is in flight.
fn apply_ai_config(room: &mut RoomState, payload: AiConfigUpdatePayload) {
    let ai = &mut room.ai;

    if let Some(frozen) = payload.frozen {
        ai.frozen = frozen;
    }
    if let Some(focus_mode) = payload.focus_mode {
        ai.focus_mode = focus_mode;
        if !focus_mode {
            ai.focus_box = None;
        }
    }
    if let Some(focus_box) = payload.focus_box {
        if ai.focus_mode {
            ai.focus_box = Some(focus_box);
        }
    }
    if let Some(ids) = payload.pinned_group_ids {
        ai.pinned_group_ids = ids;
    }
    if let Some(status) = payload.status {
        ai.status = status;
        if status == AiStatus::Frozen {
            ai.frozen = true;
        }
    }

    if ai.frozen {
        ai.status = AiStatus::Frozen;
    } else if ai.status == AiStatus::Frozen {
        ai.status = AiStatus::Idle;
    }
}

fn pin_current(room: &mut RoomState) -> MessageOutcome {
    let Some(active_id) = room.active_group_id.clone() else {
        return MessageOutcome::dropped("no_active_group");
    };
    let Some(group) = room.groups.get_mut(&active_id) else {
        return MessageOutcome::dropped("no_active_group");
    };
    group.pinned = true;
    let snapshot = group.clone();
    if !room.ai.pinned_group_ids.contains(&active_id) {
        room.ai.pinned_group_ids.push(active_id);
    }
    let elements = snapshot
        .element_ids
        .iter()
        .filter_map(|id| room.board.get(id).cloned())
        .collect();
    room.archived_groups.push(ArchivedGroup {
        group: snapshot,
        elements,
    });
    truncate_head(&mut room.archived_groups, ARCHIVED_GROUPS_CAP);
    MessageOutcome::mutated()
}

fn undo_ai(room: &mut RoomState, now: i64) -> MessageOutcome {
    let Some(entry) = room.ai_history.pop() else {
        return MessageOutcome::dropped("no_ai_history");
    };
    let mut ops: Vec<BoardOp> = Vec::new();
    for id in &entry.added_ids {
        // only roll back elements the AI still owns
        if room
            .board
            .get(id)
            .is_some_and(|el| el.common().created_by == senseboard_board::Creator::Ai)
        {
            ops.push(BoardOp::DeleteElement { id: id.clone() });
        }
    }
    for element in entry.prior_elements {
        ops.push(BoardOp::UpsertElement { element });
    }
    if ops.is_empty() {
        return MessageOutcome::dropped("no_ai_history");
    }
    let applied = reduce(&mut room.board, BoardOp::Batch { ops }, now);
    if applied.changed {
        MessageOutcome::mutated()
    } else {
        MessageOutcome::dropped("no_ai_history")
    }
}

fn restore_archived(room: &mut RoomState, group_id: &str, now: i64) -> MessageOutcome {
    let Some(archived) = room
        .archived_groups
        .iter()
        .rev()
        .find(|a| a.group.id == group_id)
        .cloned()
    else {
        return MessageOutcome::dropped("unknown_group");
    };
    let ops = archived
        .elements
        .iter()
        .cloned()
        .map(|element| BoardOp::UpsertElement { element })
        .collect();
    reduce(&mut room.board, BoardOp::Batch { ops }, now);
    room.groups
        .insert(archived.group.id.clone(), archived.group.clone());
    room.active_group_id = Some(archived.group.id);
    MessageOutcome::mutated()
}

fn clear_board(room: &mut RoomState, now: i64) -> MessageOutcome {
    let had_groups = !room.groups.is_empty();
    let applied = reduce(&mut room.board, BoardOp::ClearBoard, now);
    room.groups.clear();
    room.active_group_id = None;
    room.ai_history.clear();
    if applied.changed || had_groups {
        MessageOutcome::mutated()
    } else {
        MessageOutcome::dropped("empty_board")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senseboard_board::{BoardElement, Creator, ElementCommon, ShapeElement};
    use senseboard_protocol::frames::{
        ChatAddPayload, ContextAddPayload, EmptyPayload, TranscriptAddPayload,
        VisualHintSetPayload,
    };

    fn room() -> RoomState {
        RoomState::new("R1".into(), 0)
    }

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

    #[test]
    fn whitespace_chat_is_dropped() {
        let mut r = room();
        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::ChatAdd(ChatAddPayload { text: "  \n ".into() }),
            1,
        );
        assert_eq!(outcome.reject, Some("empty_payload"));
        assert!(r.chat.is_empty());
    }

    #[test]
    fn chat_is_capped_at_limit() {
        let mut r = room();
        for i in 0..(CHAT_CAP + 10) {
            apply_client_message(
                &mut r,
                "Alex",
                ClientFrame::ChatAdd(ChatAddPayload {
                    text: format!("message {i}"),
                }),
                i as i64,
            );
        }
        assert_eq!(r.chat.len(), CHAT_CAP);
        assert_eq!(r.chat[0].text, "message 10");
    }

    #[test]
    fn context_title_defaults() {
        let mut r = room();
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::ContextAdd(ContextAddPayload {
                title: Some("   ".into()),
                body: "release checklist".into(),
                pinned: false,
                priority: 0,
            }),
            1,
        );
        assert_eq!(r.context[0].title, DEFAULT_CONTEXT_TITLE);
    }

    #[test]
    fn low_signal_transcript_is_dropped() {
        let mut r = room();
        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::TranscriptAdd(TranscriptAddPayload {
                speaker: None,
                text: "um ok".into(),
            }),
            1,
        );
        assert_eq!(outcome.reject, Some("low_signal"));
        assert!(!outcome.transcript_accepted);
    }

    #[test]
    fn accepted_transcript_flags_the_trigger() {
        let mut r = room();
        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::TranscriptAdd(TranscriptAddPayload {
                speaker: Some("Alex".into()),
                text: "tree with root A".into(),
            }),
            1,
        );
        assert!(outcome.mutated);
        assert!(outcome.transcript_accepted);
        assert_eq!(r.transcript.len(), 1);
    }

    #[test]
    fn freeze_forces_status_and_unfreeze_resets() {
        let mut r = room();
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::AiConfigUpdate(AiConfigUpdatePayload {
                frozen: Some(true),
                ..Default::default()
            }),
            1,
        );
        assert_eq!(r.ai.status, AiStatus::Frozen);

        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::AiConfigUpdate(AiConfigUpdatePayload {
                frozen: Some(false),
                ..Default::default()
            }),
            2,
        );
        assert!(!r.ai.frozen);
        assert_eq!(r.ai.status, AiStatus::Idle);
    }

    #[test]
    fn status_frozen_implies_frozen_flag() {
        let mut r = room();
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::AiConfigUpdate(AiConfigUpdatePayload {
                status: Some(AiStatus::Frozen),
                ..Default::default()
            }),
            1,
        );
        assert!(r.ai.frozen);
    }

    #[test]
    fn disabling_focus_mode_clears_focus_box() {
        let mut r = room();
        r.ai.focus_mode = true;
        r.ai.focus_box = Some(senseboard_protocol::frames::FocusBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        });
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::AiConfigUpdate(AiConfigUpdatePayload {
                focus_mode: Some(false),
                ..Default::default()
            }),
            1,
        );
        assert!(r.ai.focus_box.is_none());
    }

    #[test]
    fn visual_hint_set_and_empty_drop() {
        let mut r = room();
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::VisualHintSet(VisualHintSetPayload {
                hint: " keep it minimal ".into(),
            }),
            1,
        );
        assert_eq!(r.visual_hint, "keep it minimal");

        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::VisualHintSet(VisualHintSetPayload { hint: "".into() }),
            2,
        );
        assert_eq!(outcome.reject, Some("empty_payload"));
        assert_eq!(r.visual_hint, "keep it minimal");
    }

    #[test]
    fn undo_ai_rolls_back_last_patch() {
        let mut r = room();
        reduce(
            &mut r.board,
            BoardOp::UpsertElement {
                element: ai_rect("n1"),
            },
            1,
        );
        r.ai_history.push(crate::types::AiHistoryEntry {
            at: 1,
            reason: "tick".into(),
            provider: "deterministic".into(),
            confidence: Some(1.0),
            added_ids: vec!["n1".into()],
            prior_elements: vec![],
        });

        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramUndoAi(EmptyPayload {}),
            2,
        );
        assert!(outcome.mutated);
        assert!(r.board.get("n1").is_none());
        assert!(r.ai_history.is_empty());
    }

    #[test]
    fn undo_ai_without_history_is_dropped() {
        let mut r = room();
        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramUndoAi(EmptyPayload {}),
            1,
        );
        assert_eq!(outcome.reject, Some("no_ai_history"));
    }

    #[test]
    fn clear_board_resets_groups_and_history() {
        let mut r = room();
        reduce(
            &mut r.board,
            BoardOp::UpsertElement {
                element: ai_rect("n1"),
            },
            1,
        );
        r.groups.insert(
            "g1".into(),
            DiagramGroup {
                id: "g1".into(),
                title: "Tree".into(),
                element_ids: vec!["n1".into()],
                pinned: false,
                created_at: 1,
            },
        );
        r.active_group_id = Some("g1".into());

        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramClearBoard(EmptyPayload {}),
            2,
        );
        assert!(r.board.is_empty());
        assert!(r.groups.is_empty());
        assert!(r.active_group_id.is_none());
    }

    #[test]
    fn pin_and_restore_archived_group() {
        let mut r = room();
        reduce(
            &mut r.board,
            BoardOp::UpsertElement {
                element: ai_rect("n1"),
            },
            1,
        );
        r.groups.insert(
            "g1".into(),
            DiagramGroup {
                id: "g1".into(),
                title: "Tree".into(),
                element_ids: vec!["n1".into()],
                pinned: false,
                created_at: 1,
            },
        );
        r.active_group_id = Some("g1".into());

        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramPinCurrent(EmptyPayload {}),
            2,
        );
        assert!(outcome.mutated);
        assert!(r.ai.pinned_group_ids.contains(&"g1".to_string()));
        assert_eq!(r.archived_groups.len(), 1);

        // wipe and restore
        apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramClearBoard(EmptyPayload {}),
            3,
        );
        assert!(r.board.is_empty());

        let outcome = apply_client_message(
            &mut r,
            "Alex",
            ClientFrame::DiagramRestoreArchived(
                senseboard_protocol::frames::RestoreArchivedPayload {
                    group_id: "g1".into(),
                },
            ),
            4,
        );
        assert!(outcome.mutated);
        assert!(r.board.get("n1").is_some());
        assert_eq!(r.active_group_id.as_deref(), Some("g1"));
    }
}
