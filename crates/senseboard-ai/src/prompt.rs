//! Prompt construction for the hosted providers.

use crate::input::AiInput;
use crate::patch::DiagramPatch;

/// System prompt enumerating the allowed ops and the policy rules. Providers
/// must answer with a single JSON object and nothing else.
pub const SYSTEM_PROMPT: &str = r#"You keep a collaborative whiteboard in sync with a live conversation.

Reply with exactly one JSON object, no prose, in one of two forms:

Form 1 (preferred) — reducer ops:
{"ops": [<BoardOp>, ...], "confidence": <0..1>}

BoardOp variants (discriminated by "op"):
  upsertElement {element}        — element carries "kind": text|rect|ellipse|diamond|triangle|sticky|frame|stroke|line|arrow
  deleteElement {id}
  appendStrokePoints {id, points}
  offsetElement {id, dx, dy}
  setElementGeometry {id, x?, y?, width?, height?}
  setElementStyle {id, style}
  setElementText {id, text}
  duplicateElement {id, newId, dx, dy}
  setElementZIndex {id, z}
  alignElements {ids, axis}
  distributeElements {ids, axis, gap?}
  clearBoard {}
  setViewport {viewport}
  batch {ops}

Form 2 (legacy) — diagram patch:
{"topic": "...", "diagramType": "flowchart"|"system_blocks"|"tree", "confidence": <0..1>,
 "actions": [{"kind": "upsertNode"|"upsertEdge"|"deleteShape"|"setTitle"|"setNotes"|"highlightOrder"|"layoutHint", ...}],
 "openQuestions": [], "conflicts": []}

Policy:
- Keep identities stable: reuse ids from activeBoard for concepts that persist.
- Delete elements for concepts the conversation has abandoned.
- Honor correction directives before anything else.
- Modality priority: correction > context > transcript.
- Respect aiConfig: stay inside focusBox when focusMode is set; never touch pinned groups.
- Set confidence honestly; below-threshold replies are sent back for revision."#;

/// Package the collected input as the structured user prompt.
pub fn build_user_prompt(input: &AiInput) -> String {
    let envelope = serde_json::json!({
        "transcriptWindow": input.transcript_window,
        "corrections": input.corrections,
        "chat": input.chat,
        "contextItems": input.context_items,
        "visualHint": input.visual_hint,
        "modalityPriority": ["correction", "context", "transcript"],
        "correctionDirectives": input.corrections,
        "activeBoard": {
            "elements": input.active_elements,
            "aiElementIds": input.ai_element_ids,
        },
        "aiConfig": input.ai_config,
        "memberName": input.member_name,
        "memberContext": input.member_context,
    });
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| "{}".to_string())
}

/// Follow-up prompt for one revision round: the previous attempt plus a
/// directive to close the gap to the reference heuristic.
pub fn build_revision_prompt(base: &str, previous_reply: &str, reference: &DiagramPatch) -> String {
    let reference_json = serde_json::to_string(reference).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{base}\n\n\
         Previous attempt (confidence below threshold):\n{previous_reply}\n\n\
         A deterministic reference generator produced this outline from the same input:\n\
         {reference_json}\n\n\
         Revise your reply: cover at least the entities and relations of the reference, \
         keep ids stable with the active board, resolve the listed corrections, and raise \
         confidence only if the result genuinely matches the conversation."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{AiConfigSummary, AiInput};

    fn minimal_input() -> AiInput {
        AiInput {
            room_id: "R1".into(),
            transcript_window: vec![],
            corrections: vec!["actually post-order".into()],
            chat: vec![],
            context_items: vec![],
            visual_hint: "keep it sparse".into(),
            ai_config: AiConfigSummary {
                frozen: false,
                focus_mode: false,
                focus_box: None,
                pinned_group_ids: vec![],
            },
            active_elements: vec![],
            ai_element_ids: vec!["sense-a-1".into()],
            member_name: None,
            member_context: vec![],
        }
    }

    #[test]
    fn user_prompt_is_valid_json_with_expected_fields() {
        let prompt = build_user_prompt(&minimal_input());
        let value: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(value["modalityPriority"][0], "correction");
        assert_eq!(value["correctionDirectives"][0], "actually post-order");
        assert_eq!(value["activeBoard"]["aiElementIds"][0], "sense-a-1");
        assert_eq!(value["visualHint"], "keep it sparse");
    }

    #[test]
    fn system_prompt_names_every_op() {
        for op in [
            "upsertElement",
            "deleteElement",
            "appendStrokePoints",
            "offsetElement",
            "setElementGeometry",
            "setElementStyle",
            "setElementText",
            "duplicateElement",
            "setElementZIndex",
            "alignElements",
            "distributeElements",
            "clearBoard",
            "setViewport",
            "batch",
        ] {
            assert!(SYSTEM_PROMPT.contains(op), "missing {op}");
        }
    }

    #[test]
    fn revision_prompt_embeds_previous_reply_and_reference() {
        let reference = crate::deterministic::generate(&["tree with root A".to_string()]);
        let prompt = build_revision_prompt("base", r#"{"ops":[]}"#, &reference);
        assert!(prompt.contains("Previous attempt"));
        assert!(prompt.contains(r#"{"ops":[]}"#));
        assert!(prompt.contains("reference generator"));
    }
}
