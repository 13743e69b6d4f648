//! Lexical cues shared by the transcript acceptance gate and the AI input
//! filter. One list per concern so the gate and the filter can never drift.

/// Minimum character count for a transcript chunk to be considered on its
/// own; shorter chunks survive only when they carry a cue word.
pub const MIN_TRANSCRIPT_CHARS: usize = 12;

/// Words that mark a chunk as carrying drawable information.
pub const INFORMATIONAL_KEYWORDS: &[&str] = &[
    "tree", "root", "node", "child", "children", "parent", "edge", "graph",
    "flow", "step", "stage", "branch", "service", "server", "client", "api",
    "cache", "queue", "database", "db", "architecture", "system", "diagram",
    "box", "arrow", "label", "order", "traversal", "pipeline", "layer",
];

/// Phrases that signal a correction of earlier content. Correction chunks are
/// always preserved, whatever their length, and take priority in prompts.
pub const CORRECTION_CUES: &[&str] = &[
    "actually", "instead", "no wait", "scratch that", "correction", "rather",
    "i meant", "not that", "undo", "pre-order", "post-order", "in-order",
];

/// Cues that classify a conversation as describing a tree.
pub const TREE_CUES: &[&str] = &["tree", "root", "child", "children", "leaf", "parent"];

/// Cues that classify a conversation as describing system blocks.
pub const SYSTEM_CUES: &[&str] = &[
    "architecture", "service", "server", "cache", "database", "queue", "api", "->",
];

/// Cues that classify a conversation as describing a flowchart.
pub const FLOW_CUES: &[&str] = &["flow", "step", "then", "stage", "process", "pipeline"];

/// True when the text contains any of the given cues (case-insensitive).
pub fn contains_cue(text: &str, cues: &[&str]) -> bool {
    let lower = text.to_lowercase();
    cues.iter().any(|cue| lower.contains(cue))
}

/// The store-level acceptance gate: long enough, or carrying a keyword or a
/// correction cue.
pub fn is_acceptable_transcript(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.chars().count() >= MIN_TRANSCRIPT_CHARS
        || contains_cue(trimmed, INFORMATIONAL_KEYWORDS)
        || contains_cue(trimmed, CORRECTION_CUES)
}
