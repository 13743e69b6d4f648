//! Input assembly and the signal gate.
//!
//! `collect_ai_input` distills a room into the structured envelope the
//! prompt builder serializes. The engine-level transcript filter is stricter
//! than the store's acceptance gate: a line must carry an informational
//! keyword, a correction cue, or enough length to plausibly describe
//! something drawable.

use serde::Serialize;

use senseboard_core::config::DEFAULT_TRANSCRIPT_WINDOW_SECS;
use senseboard_core::lexicon::{contains_cue, CORRECTION_CUES, INFORMATIONAL_KEYWORDS};
use senseboard_rooms::types::RoomState;
use senseboard_protocol::frames::FocusBox;

/// Keyword-less lines need this many chars to survive the engine filter.
const KEYWORDLESS_MIN_CHARS: usize = 24;
const MAX_CHAT_LINES: usize = 20;
const MAX_CONTEXT_ITEMS: usize = 12;
const MAX_ACTIVE_ELEMENTS: usize = 200;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    pub author: String,
    pub text: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextLine {
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveElement {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiConfigSummary {
    pub frozen: bool,
    pub focus_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_box: Option<FocusBox>,
    pub pinned_group_ids: Vec<String>,
}

/// Everything the prompt builder needs, already filtered and bounded.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiInput {
    pub room_id: String,
    pub transcript_window: Vec<TranscriptLine>,
    pub corrections: Vec<String>,
    pub chat: Vec<ChatLine>,
    pub context_items: Vec<ContextLine>,
    pub visual_hint: String,
    pub ai_config: AiConfigSummary,
    pub active_elements: Vec<ActiveElement>,
    /// Ids of AI-created elements on the target board, for identity-stable
    /// updates and stale cleanup.
    pub ai_element_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub member_context: Vec<String>,
}

impl AiInput {
    /// Combined text lines fed to the deterministic generator and the
    /// fingerprint: filtered transcript first, then chat.
    pub fn signal_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .transcript_window
            .iter()
            .map(|l| l.text.clone())
            .collect();
        lines.extend(self.chat.iter().map(|c| c.text.clone()));
        lines
    }
}

/// Engine-level transcript filter. Stricter than the store's gate.
pub fn line_has_signal(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    contains_cue(trimmed, CORRECTION_CUES)
        || contains_cue(trimmed, INFORMATIONAL_KEYWORDS)
        || trimmed.chars().count() >= KEYWORDLESS_MIN_CHARS
}

/// Gather the prompt input for the shared board (or, with `member` set, for
/// one member's personal board).
pub fn collect_ai_input(
    room: &RoomState,
    window_seconds: Option<u64>,
    now: i64,
    member: Option<(&str, Vec<String>)>,
) -> AiInput {
    let window = window_seconds.unwrap_or(DEFAULT_TRANSCRIPT_WINDOW_SECS);
    let cutoff = now - (window as i64) * 1_000;

    let mut transcript_window = Vec::new();
    let mut corrections = Vec::new();
    for chunk in &room.transcript {
        if chunk.at < cutoff {
            continue;
        }
        if contains_cue(&chunk.text, CORRECTION_CUES) {
            corrections.push(chunk.text.clone());
        }
        if line_has_signal(&chunk.text) {
            transcript_window.push(TranscriptLine {
                speaker: chunk.speaker.clone(),
                text: chunk.text.clone(),
                at: chunk.at,
            });
        }
    }

    let chat: Vec<ChatLine> = room
        .chat
        .iter()
        .rev()
        .take(MAX_CHAT_LINES)
        .map(|m| ChatLine {
            author: m.author.clone(),
            text: m.text.clone(),
            kind: match m.kind {
                senseboard_rooms::types::ChatKind::User => "user".to_string(),
                senseboard_rooms::types::ChatKind::System => "system".to_string(),
            },
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    // Pinned first, then high priority, then newest.
    let mut context_sorted: Vec<&senseboard_rooms::types::ContextItem> =
        room.context.iter().collect();
    context_sorted.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then(b.priority.cmp(&a.priority))
            .then(b.created_at.cmp(&a.created_at))
    });
    let context_items: Vec<ContextLine> = context_sorted
        .into_iter()
        .take(MAX_CONTEXT_ITEMS)
        .map(|c| ContextLine {
            title: c.title.clone(),
            body: c.body.clone(),
            pinned: c.pinned,
            priority: c.priority,
        })
        .collect();

    // Personal jobs look at the member's own board; shared jobs at the room's.
    let member_key = member
        .as_ref()
        .map(|(name, _)| senseboard_core::types::name_key(name));
    let board = match &member_key {
        Some(key) => room
            .personal
            .get(key)
            .map(|p| &p.board)
            .unwrap_or(&room.board),
        None => &room.board,
    };

    let active_elements: Vec<ActiveElement> = board
        .iter_ordered()
        .take(MAX_ACTIVE_ELEMENTS)
        .map(|el| ActiveElement {
            id: el.id().to_string(),
            kind: el.kind().to_string(),
            text: element_text(el),
        })
        .collect();
    let ai_element_ids = board.ai_element_ids();

    let (member_name, member_context) = match member {
        Some((name, lines)) => (Some(name.to_string()), lines),
        None => (None, Vec::new()),
    };

    AiInput {
        room_id: room.room_id.clone(),
        transcript_window,
        corrections,
        chat,
        context_items,
        visual_hint: room.visual_hint.clone(),
        ai_config: AiConfigSummary {
            frozen: room.ai.frozen,
            focus_mode: room.ai.focus_mode,
            focus_box: room.ai.focus_box,
            pinned_group_ids: room.ai.pinned_group_ids.clone(),
        },
        active_elements,
        ai_element_ids,
        member_name,
        member_context,
    }
}

fn element_text(el: &senseboard_board::BoardElement) -> Option<String> {
    use senseboard_board::BoardElement;
    match el {
        BoardElement::Text(e) => Some(e.text.clone()),
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => e.text.clone(),
        BoardElement::Sticky(e) => Some(e.text.clone()),
        BoardElement::Frame(e) => e.title.clone(),
        BoardElement::Stroke(_) | BoardElement::Line(_) | BoardElement::Arrow(_) => None,
    }
}

/// True iff the filtered transcript window is non-empty, or a chat/context
/// item arrived after the last applied patch.
pub fn has_ai_signal(room: &RoomState, window_seconds: Option<u64>, now: i64) -> bool {
    let window = window_seconds.unwrap_or(DEFAULT_TRANSCRIPT_WINDOW_SECS);
    let cutoff = now - (window as i64) * 1_000;

    let window_live = room
        .transcript
        .iter()
        .any(|c| c.at >= cutoff && line_has_signal(&c.text));
    if window_live {
        return true;
    }

    room.chat.iter().any(|m| m.at > room.last_ai_patch_at)
        || room
            .context
            .iter()
            .any(|c| c.created_at > room.last_ai_patch_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use senseboard_rooms::types::{ChatKind, ChatMessage, ContextItem, TranscriptChunk};

    fn room() -> RoomState {
        RoomState::new("R1".into(), 0)
    }

    fn chunk(text: &str, at: i64) -> TranscriptChunk {
        TranscriptChunk {
            id: format!("c{at}"),
            speaker: None,
            text: text.to_string(),
            at,
        }
    }

    #[test]
    fn fresh_room_has_no_signal() {
        assert!(!has_ai_signal(&room(), Some(30), 100_000));
    }

    #[test]
    fn qualifying_transcript_raises_signal() {
        let mut r = room();
        r.transcript.push(chunk("tree with root A", 99_000));
        assert!(has_ai_signal(&r, Some(30), 100_000));
    }

    #[test]
    fn stale_transcript_is_outside_the_window() {
        let mut r = room();
        r.transcript.push(chunk("tree with root A", 10_000));
        assert!(!has_ai_signal(&r, Some(30), 100_000));
    }

    #[test]
    fn fresh_chat_counts_as_signal() {
        let mut r = room();
        r.last_ai_patch_at = 50_000;
        r.chat.push(ChatMessage {
            id: "m1".into(),
            author: "Alex".into(),
            text: "add the cache".into(),
            kind: ChatKind::User,
            at: 60_000,
        });
        assert!(has_ai_signal(&r, Some(30), 100_000));
        r.chat[0].at = 40_000;
        assert!(!has_ai_signal(&r, Some(30), 100_000));
    }

    #[test]
    fn corrections_are_collected_even_when_short() {
        let mut r = room();
        r.transcript.push(chunk("actually post-order", 99_000));
        let input = collect_ai_input(&r, Some(30), 100_000, None);
        assert_eq!(input.corrections.len(), 1);
        assert_eq!(input.transcript_window.len(), 1);
    }

    #[test]
    fn keywordless_noise_is_filtered_from_the_window() {
        let mut r = room();
        r.transcript.push(chunk("yeah that sounds fine ok", 99_000));
        r.transcript.push(chunk("the api calls the cache first", 99_500));
        let input = collect_ai_input(&r, Some(30), 100_000, None);
        // both within window, one carries keywords, the other survives on
        // length alone
        assert_eq!(input.transcript_window.len(), 2);

        r.transcript.push(chunk("uh hm ok", 99_600));
        let input = collect_ai_input(&r, Some(30), 100_000, None);
        assert_eq!(input.transcript_window.len(), 2);
    }

    #[test]
    fn context_is_ordered_pinned_priority_newest() {
        let mut r = room();
        for (id, pinned, priority, at) in [
            ("low", false, 0, 3),
            ("pin", true, 0, 1),
            ("hot", false, 9, 2),
        ] {
            r.context.push(ContextItem {
                id: id.into(),
                title: id.into(),
                body: "body".into(),
                pinned,
                priority,
                created_at: at,
            });
        }
        let input = collect_ai_input(&r, Some(30), 100_000, None);
        let titles: Vec<&str> = input.context_items.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["pin", "hot", "low"]);
    }

    #[test]
    fn member_input_reads_the_personal_board() {
        let mut r = room();
        r.personal.insert(
            "alex".into(),
            senseboard_rooms::types::PersonalBoard::default(),
        );
        let input = collect_ai_input(
            &r,
            Some(30),
            100_000,
            Some(("Alex", vec!["prefers trees".into()])),
        );
        assert_eq!(input.member_name.as_deref(), Some("Alex"));
        assert_eq!(input.member_context, vec!["prefers trees".to_string()]);
        assert!(input.active_elements.is_empty());
    }
}
