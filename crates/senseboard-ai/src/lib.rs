//! `senseboard-ai` — the diagram generation pipeline.
//!
//! # Overview
//!
//! The engine assembles a structured input from the room ([`input`]), builds
//! prompts ([`prompt`]), calls a pluggable provider ([`provider`] and the
//! concrete backends), and revises the reply until it clears the confidence
//! threshold. Hosted replies arrive either as reducer-ready `BoardOp` lists
//! or as the legacy [`patch::DiagramPatch`] action stream; the latter flows
//! through [`adapter::adapt_patch`] so everything downstream sees the same
//! op vocabulary. When no hosted provider is configured, or one fails, the
//! [`deterministic`] generator produces a reproducible patch offline.

pub mod adapter;
pub mod anthropic;
pub mod codex_cli;
pub mod deterministic;
pub mod engine;
pub mod fingerprint;
pub mod input;
pub mod openai;
pub mod patch;
pub mod prompt;
pub mod provider;
pub mod transcribe;

pub use engine::{DiagramEngine, EngineReply};
pub use input::{collect_ai_input, has_ai_signal, AiInput};
pub use patch::{DiagramAction, DiagramPatch, DiagramType};
pub use provider::{DiagramProvider, ProviderError};
pub use transcribe::{DeterministicTranscriber, OpenAiTranscriber, Transcription, TranscriptionProvider};
