//! The generation engine: provider invocation with the confidence-driven
//! revision loop, reply parsing, and deterministic fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use senseboard_board::BoardOp;
use senseboard_core::config::{AiConfig, ProviderKind, ReviewConfig};

use crate::adapter::adapt_patch;
use crate::anthropic::AnthropicProvider;
use crate::codex_cli::CodexCliProvider;
use crate::deterministic;
use crate::fingerprint::fingerprint_parts;
use crate::input::AiInput;
use crate::openai::OpenAiProvider;
use crate::patch::DiagramPatch;
use crate::prompt::{build_revision_prompt, build_user_prompt, SYSTEM_PROMPT};
use crate::provider::{DiagramProvider, ProviderError};

/// Final output of one engine invocation, ready for the reducer.
#[derive(Debug, Clone)]
pub struct EngineReply {
    pub ops: Vec<BoardOp>,
    pub confidence: f64,
    pub provider: String,
    pub topic: Option<String>,
    /// Digest over the consumed inputs and the op list, used by the
    /// scheduler to suppress idempotent tick updates.
    pub fingerprint: u64,
    pub revisions_used: u32,
}

enum Backend {
    Deterministic,
    Hosted(Arc<dyn DiagramProvider>),
}

pub struct DiagramEngine {
    backend: Backend,
    review: ReviewConfig,
}

impl DiagramEngine {
    /// Build the engine from config. `auto` picks the first hosted provider
    /// with usable credentials and falls back to the offline generator.
    pub fn from_config(ai: &AiConfig) -> Self {
        let timeout = ai.provider_timeout_ms;
        let backend = match ai.provider {
            ProviderKind::Deterministic => Backend::Deterministic,
            ProviderKind::Openai => match &ai.openai_api_key {
                Some(key) => Backend::Hosted(Arc::new(OpenAiProvider::new(
                    key.clone(),
                    ai.openai_model.clone(),
                    timeout,
                ))),
                None => Backend::Deterministic,
            },
            ProviderKind::Anthropic => match &ai.anthropic_api_key {
                Some(key) => Backend::Hosted(Arc::new(AnthropicProvider::new(
                    key.clone(),
                    ai.anthropic_model.clone(),
                    timeout,
                ))),
                None => Backend::Deterministic,
            },
            ProviderKind::CodexCli => Backend::Hosted(Arc::new(CodexCliProvider::new(
                ai.codex_model.clone(),
                timeout,
            ))),
            ProviderKind::Auto => {
                if let Some(key) = &ai.openai_api_key {
                    Backend::Hosted(Arc::new(OpenAiProvider::new(
                        key.clone(),
                        ai.openai_model.clone(),
                        timeout,
                    )))
                } else if let Some(key) = &ai.anthropic_api_key {
                    Backend::Hosted(Arc::new(AnthropicProvider::new(
                        key.clone(),
                        ai.anthropic_model.clone(),
                        timeout,
                    )))
                } else if which::which("codex").is_ok() {
                    Backend::Hosted(Arc::new(CodexCliProvider::new(
                        ai.codex_model.clone(),
                        timeout,
                    )))
                } else {
                    Backend::Deterministic
                }
            }
        };
        Self {
            backend,
            review: ai.review.clone(),
        }
    }

    /// Offline engine; also the shape tests use.
    pub fn deterministic() -> Self {
        Self {
            backend: Backend::Deterministic,
            review: ReviewConfig::default(),
        }
    }

    /// Engine with an explicit provider (tests and custom wiring).
    pub fn with_provider(provider: Arc<dyn DiagramProvider>, review: ReviewConfig) -> Self {
        Self {
            backend: Backend::Hosted(provider),
            review,
        }
    }

    pub fn provider_name(&self) -> &str {
        match &self.backend {
            Backend::Deterministic => "deterministic",
            Backend::Hosted(p) => p.name(),
        }
    }

    pub async fn preflight(&self) -> Result<(), ProviderError> {
        match &self.backend {
            Backend::Deterministic => Ok(()),
            Backend::Hosted(p) => p.preflight().await,
        }
    }

    /// One full generation. Errors only when the provider failed *and* the
    /// deterministic fallback produced nothing renderable.
    pub async fn generate(&self, input: &AiInput, now: i64) -> Result<EngineReply, ProviderError> {
        let lines = input.signal_lines();
        let seed = input_seed(input, &lines);

        match &self.backend {
            Backend::Deterministic => Ok(self.deterministic_reply(input, &lines, seed, now, 0)),
            Backend::Hosted(provider) => {
                self.hosted_generate(provider.as_ref(), input, &lines, seed, now)
                    .await
            }
        }
    }

    fn deterministic_reply(
        &self,
        input: &AiInput,
        lines: &[String],
        seed: u64,
        now: i64,
        revisions_used: u32,
    ) -> EngineReply {
        let patch = deterministic::generate(lines);
        let ops = adapt_patch(&patch, &input.ai_element_ids, seed, now);
        let fingerprint = reply_fingerprint(lines, &ops);
        EngineReply {
            ops,
            confidence: patch.clamped_confidence(),
            provider: "deterministic".to_string(),
            topic: Some(patch.topic),
            fingerprint,
            revisions_used,
        }
    }

    async fn hosted_generate(
        &self,
        provider: &dyn DiagramProvider,
        input: &AiInput,
        lines: &[String],
        seed: u64,
        now: i64,
    ) -> Result<EngineReply, ProviderError> {
        let base_prompt = build_user_prompt(input);
        let reference = deterministic::generate(lines);
        let threshold = self.review.threshold();
        let budget = self.review.revisions();

        let mut best: Option<ParsedReply> = None;
        let mut prompt = base_prompt.clone();
        let mut revisions_used = 0u32;
        let mut last_error: Option<ProviderError> = None;

        for round in 0..budget {
            revisions_used = round;
            let raw = match provider.generate(SYSTEM_PROMPT, &prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(provider = provider.name(), round, error = %e, "provider call failed");
                    last_error = Some(e);
                    break;
                }
            };

            match parse_reply(&raw, input, seed, now) {
                Some(parsed) => {
                    let good_enough = parsed.confidence >= threshold;
                    let better = best
                        .as_ref()
                        .map(|b| parsed.confidence > b.confidence)
                        .unwrap_or(true);
                    if better {
                        best = Some(parsed);
                    }
                    if good_enough {
                        break;
                    }
                }
                None => {
                    debug!(provider = provider.name(), round, "unparseable reply");
                }
            }
            prompt = build_revision_prompt(&base_prompt, &raw, &reference);
        }

        match best {
            Some(parsed) if !parsed.ops.is_empty() => {
                let fingerprint = reply_fingerprint(lines, &parsed.ops);
                Ok(EngineReply {
                    ops: parsed.ops,
                    confidence: parsed.confidence,
                    provider: provider.name().to_string(),
                    topic: parsed.topic,
                    fingerprint,
                    revisions_used: revisions_used + 1,
                })
            }
            // Empty or absent reply: fall back to the offline generator so a
            // flaky provider degrades instead of going dark.
            _ => {
                let fallback = self.deterministic_reply(input, lines, seed, now, revisions_used);
                if fallback.ops.is_empty() {
                    if let Some(e) = last_error {
                        return Err(e);
                    }
                }
                Ok(fallback)
            }
        }
    }
}

struct ParsedReply {
    ops: Vec<BoardOp>,
    confidence: f64,
    topic: Option<String>,
}

/// Parse a provider reply: either `{"ops": [...], "confidence": x}` or a
/// legacy `DiagramPatch`. Markdown fences are tolerated.
fn parse_reply(raw: &str, input: &AiInput, seed: u64, now: i64) -> Option<ParsedReply> {
    let cleaned = strip_fences(raw);
    let value: serde_json::Value = serde_json::from_str(cleaned).ok()?;

    if value.get("ops").is_some() {
        let ops: Vec<BoardOp> = serde_json::from_value(value.get("ops")?.clone()).ok()?;
        let confidence = value
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let topic = value
            .get("topic")
            .and_then(|t| t.as_str())
            .map(String::from);
        return Some(ParsedReply {
            ops,
            confidence,
            topic,
        });
    }

    let patch: DiagramPatch = serde_json::from_value(value).ok()?;
    let confidence = patch.clamped_confidence();
    let ops = adapt_patch(&patch, &input.ai_element_ids, seed, now);
    Some(ParsedReply {
        ops,
        confidence,
        topic: Some(patch.topic),
    })
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

fn input_seed(input: &AiInput, lines: &[String]) -> u64 {
    let mut parts: Vec<String> = lines.to_vec();
    parts.push(input.room_id.clone());
    fingerprint_parts(&parts)
}

fn reply_fingerprint(lines: &[String], ops: &[BoardOp]) -> u64 {
    let mut parts: Vec<String> = lines.to_vec();
    for op in ops {
        summarize_op(op, &mut parts);
    }
    fingerprint_parts(&parts)
}

/// Time-independent identity of an op: two patches that draw the same thing
/// must fingerprint identically even when their creation stamps differ.
fn summarize_op(op: &BoardOp, parts: &mut Vec<String>) {
    match op {
        BoardOp::UpsertElement { element } => {
            let text = match element {
                senseboard_board::BoardElement::Text(e) => e.text.clone(),
                senseboard_board::BoardElement::Rect(e)
                | senseboard_board::BoardElement::Ellipse(e)
                | senseboard_board::BoardElement::Diamond(e)
                | senseboard_board::BoardElement::Triangle(e) => e.text.clone().unwrap_or_default(),
                senseboard_board::BoardElement::Sticky(e) => e.text.clone(),
                senseboard_board::BoardElement::Frame(e) => e.title.clone().unwrap_or_default(),
                _ => String::new(),
            };
            parts.push(format!("upsert:{}:{}:{}", element.kind(), element.id(), text));
        }
        BoardOp::DeleteElement { id } => parts.push(format!("delete:{id}")),
        BoardOp::AppendStrokePoints { id, points } => {
            parts.push(format!("append:{id}:{}", points.len()))
        }
        BoardOp::OffsetElement { id, dx, dy } => parts.push(format!("offset:{id}:{dx}:{dy}")),
        BoardOp::SetElementGeometry { id, .. } => parts.push(format!("geometry:{id}")),
        BoardOp::SetElementStyle { id, .. } => parts.push(format!("style:{id}")),
        BoardOp::SetElementText { id, text } => parts.push(format!("text:{id}:{text}")),
        BoardOp::DuplicateElement { id, new_id, .. } => {
            parts.push(format!("duplicate:{id}:{new_id}"))
        }
        BoardOp::SetElementZIndex { id, z } => parts.push(format!("z:{id}:{z}")),
        BoardOp::AlignElements { ids, .. } => parts.push(format!("align:{}", ids.join(","))),
        BoardOp::DistributeElements { ids, .. } => {
            parts.push(format!("distribute:{}", ids.join(",")))
        }
        BoardOp::ClearBoard => parts.push("clear".to_string()),
        BoardOp::SetViewport { .. } => parts.push("viewport".to_string()),
        BoardOp::Batch { ops } => {
            for inner in ops {
                summarize_op(inner, parts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{AiConfigSummary, AiInput};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl DiagramProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Unavailable("script exhausted".into())))
        }
    }

    fn input_with(lines: &[&str]) -> AiInput {
        AiInput {
            room_id: "R1".into(),
            transcript_window: lines
                .iter()
                .enumerate()
                .map(|(i, l)| crate::input::TranscriptLine {
                    speaker: None,
                    text: l.to_string(),
                    at: i as i64,
                })
                .collect(),
            corrections: vec![],
            chat: vec![],
            context_items: vec![],
            visual_hint: String::new(),
            ai_config: AiConfigSummary {
                frozen: false,
                focus_mode: false,
                focus_box: None,
                pinned_group_ids: vec![],
            },
            active_elements: vec![],
            ai_element_ids: vec![],
            member_name: None,
            member_context: vec![],
        }
    }

    fn review(max: u32, threshold: f64) -> ReviewConfig {
        ReviewConfig {
            max_revisions: max,
            confidence_threshold: threshold,
        }
    }

    fn two_tree_patch_json(confidence: f64) -> String {
        serde_json::json!({
            "topic": "Two trees",
            "diagramType": "tree",
            "confidence": confidence,
            "actions": [
                { "kind": "upsertNode", "id": "a-tree", "label": "A tree" },
                { "kind": "upsertNode", "id": "b-tree", "label": "B tree" },
                { "kind": "upsertNode", "id": "c1", "label": "C1" },
                { "kind": "upsertEdge", "id": "e1", "from": "a-tree", "to": "c1" },
                { "kind": "upsertEdge", "id": "e2", "from": "b-tree", "to": "c1" },
            ],
        })
        .to_string()
    }

    fn node_texts(reply: &EngineReply) -> Vec<String> {
        reply
            .ops
            .iter()
            .filter_map(|op| match op {
                BoardOp::UpsertElement { element } => match element {
                    senseboard_board::BoardElement::Rect(e) => e.text.clone(),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn deterministic_engine_emits_ops_directly() {
        let engine = DiagramEngine::deterministic();
        let input = input_with(&["tree with root A", "children B and C"]);
        let reply = engine.generate(&input, 1).await.unwrap();
        assert_eq!(reply.provider, "deterministic");
        assert!(reply.confidence >= 0.98);
        assert!(reply.ops.len() >= 5);
    }

    #[tokio::test]
    async fn revision_loop_iterates_until_threshold() {
        let provider = ScriptedProvider::new(vec![
            Ok(two_tree_patch_json(0.45)),
            Ok(two_tree_patch_json(0.62)),
            Ok(two_tree_patch_json(0.99)),
        ]);
        let engine = DiagramEngine::with_provider(provider.clone(), review(20, 0.98));
        let input = input_with(&["a tree and b tree sharing C1"]);
        let reply = engine.generate(&input, 1).await.unwrap();

        assert_eq!(provider.calls(), 3);
        assert!(reply.confidence >= 0.98);
        assert!(reply.revisions_used <= 20);

        let texts = node_texts(&reply);
        assert!(texts.iter().any(|t| t.to_lowercase().contains("a tree")));
        assert!(texts.iter().any(|t| t.to_lowercase().contains("b tree")));
        assert!(texts.iter().any(|t| t == "C1"));
    }

    #[tokio::test]
    async fn revision_budget_keeps_best_reply() {
        let provider = ScriptedProvider::new(vec![
            Ok(two_tree_patch_json(0.30)),
            Ok(two_tree_patch_json(0.60)),
            Ok(two_tree_patch_json(0.50)),
        ]);
        let engine = DiagramEngine::with_provider(provider.clone(), review(3, 0.98));
        let input = input_with(&["a tree and b tree sharing C1"]);
        let reply = engine.generate(&input, 1).await.unwrap();

        assert_eq!(provider.calls(), 3);
        assert!((reply.confidence - 0.60).abs() < 1e-9);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_deterministic() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Unavailable(
            "boom".into(),
        ))]);
        let engine = DiagramEngine::with_provider(provider, review(5, 0.98));
        let input = input_with(&["tree with root A", "children B and C"]);
        let reply = engine.generate(&input, 1).await.unwrap();
        assert_eq!(reply.provider, "deterministic");
        assert!(!reply.ops.is_empty());
    }

    #[tokio::test]
    async fn ops_form_reply_is_parsed_without_adaptation() {
        let raw = serde_json::json!({
            "ops": [
                { "op": "upsertElement", "element": {
                    "kind": "sticky", "id": "s1", "createdAt": 0, "createdBy": "ai",
                    "x": 300.0, "y": 300.0, "width": 160.0, "height": 80.0,
                    "text": "Decision"
                }},
            ],
            "confidence": 0.99,
            "topic": "Decisions",
        })
        .to_string();
        let provider = ScriptedProvider::new(vec![Ok(format!("```json\n{raw}\n```"))]);
        let engine = DiagramEngine::with_provider(provider, review(5, 0.98));
        let input = input_with(&["we decided on the cache"]);
        let reply = engine.generate(&input, 1).await.unwrap();
        assert_eq!(reply.topic.as_deref(), Some("Decisions"));
        assert_eq!(reply.ops.len(), 1);
        assert_eq!(reply.provider, "scripted");
    }

    #[tokio::test]
    async fn identical_input_produces_identical_fingerprint() {
        let engine = DiagramEngine::deterministic();
        let input = input_with(&["tree with root A"]);
        let a = engine.generate(&input, 1).await.unwrap();
        let b = engine.generate(&input, 2).await.unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);

        let other = input_with(&["tree with root Z"]);
        let c = engine.generate(&other, 1).await.unwrap();
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}
