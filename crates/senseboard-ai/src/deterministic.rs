//! Offline diagram generator.
//!
//! Classifies the conversation window into tree / system blocks / flowchart
//! by lexical cues and emits a [`DiagramPatch`] without touching the
//! network. Same input, same output — the only layout variation is jitter
//! seeded by a stable hash of the input, applied later by the adapter.
//!
//! This generator is both the `deterministic` provider and the reference
//! heuristic quoted back at hosted providers during the revision loop.

use std::collections::BTreeMap;

use senseboard_core::lexicon::{contains_cue, SYSTEM_CUES, TREE_CUES};

use crate::patch::{DiagramAction, DiagramPatch, DiagramType, NodeShape};

/// Words never treated as node identifiers.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "with", "of", "to", "is", "are", "was", "be",
    "we", "our", "that", "this", "it", "its", "have", "has", "had", "then",
    "tree", "trees", "root", "roots", "child", "children", "node", "nodes",
    "sharing", "share", "shares", "shared", "step", "steps", "order", "so",
    "like", "for", "on", "in", "at", "by", "from", "into", "two", "three",
];

/// Tree-name candidates exclude obvious determiners but keep short labels
/// ("a tree", "b tree" are how people name trees on a whiteboard).
const TREE_NAME_BLOCKLIST: &[&str] = &["the", "this", "that", "binary", "new", "each", "every"];

pub fn generate(lines: &[String]) -> DiagramPatch {
    let joined = lines.join("\n");
    let diagram_type = classify(&joined);
    match diagram_type {
        DiagramType::Tree => generate_tree(&joined),
        DiagramType::SystemBlocks => generate_system_blocks(&joined),
        DiagramType::Flowchart => generate_flowchart(lines),
    }
}

pub fn classify(text: &str) -> DiagramType {
    if contains_cue(text, TREE_CUES) {
        DiagramType::Tree
    } else if text.contains("->") || contains_cue(text, SYSTEM_CUES) {
        DiagramType::SystemBlocks
    } else {
        DiagramType::Flowchart
    }
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_stopword(word: &str) -> bool {
    // Uppercase or digit-bearing tokens are labels ("A", "C1"), never words.
    if word.chars().any(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return false;
    }
    STOPWORDS.contains(&word)
}

fn slug(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

// --- trees ------------------------------------------------------------------

struct TreeSketch {
    /// root label → child labels, insertion-ordered via BTreeMap on index.
    roots: Vec<String>,
    children: BTreeMap<String, Vec<String>>,
}

impl TreeSketch {
    fn add_root(&mut self, label: String) {
        if !self.roots.contains(&label) {
            self.children.entry(label.clone()).or_default();
            self.roots.push(label);
        }
    }

    fn add_child(&mut self, root: &str, child: String) {
        let entry = self.children.entry(root.to_string()).or_default();
        if !entry.contains(&child) && child != root {
            entry.push(child);
        }
    }
}

fn generate_tree(text: &str) -> DiagramPatch {
    let mut sketch = TreeSketch {
        roots: Vec::new(),
        children: BTreeMap::new(),
    };

    let words: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();

    // Named trees: "<ident> tree" names a root after the preceding word.
    for pair in words.windows(2) {
        let (name, kw) = (pair[0], pair[1]);
        if kw.eq_ignore_ascii_case("tree")
            && is_identifier(name)
            && !TREE_NAME_BLOCKLIST.contains(&name.to_lowercase().as_str())
            && !name.eq_ignore_ascii_case("with")
        {
            sketch.add_root(format!("{} tree", name.to_lowercase()));
        }
    }

    // Cue-driven scan: root X, children A and B, sharing C.
    let mut i = 0;
    while i < words.len() {
        let word = words[i].to_lowercase();
        match word.as_str() {
            "root" | "roots" => {
                if let Some(ident) = next_identifier(&words, i + 1) {
                    sketch.add_root(ident.to_string());
                }
            }
            "child" | "children" => {
                let parent = sketch.roots.last().cloned();
                if let Some(parent) = parent {
                    let mut j = i + 1;
                    while j < words.len() {
                        let w = words[j];
                        if w.eq_ignore_ascii_case("and") || w.eq_ignore_ascii_case("are") {
                            j += 1;
                            continue;
                        }
                        if is_identifier(w) && !is_stopword(w) {
                            sketch.add_child(&parent, w.to_string());
                            j += 1;
                            continue;
                        }
                        break;
                    }
                }
            }
            "sharing" | "share" | "shares" | "shared" => {
                if let Some(ident) = next_identifier(&words, i + 1) {
                    for root in sketch.roots.clone() {
                        sketch.add_child(&root, ident.to_string());
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    // A tree conversation with no parsed structure still yields one node so
    // the board reflects that a tree is being discussed.
    if sketch.roots.is_empty() {
        sketch.add_root("tree".to_string());
    }

    let mut actions = Vec::new();
    for root in &sketch.roots {
        actions.push(DiagramAction::UpsertNode {
            id: slug(root),
            label: root.clone(),
            x: None,
            y: None,
            shape: NodeShape::Box,
        });
        for child in sketch.children.get(root).into_iter().flatten() {
            actions.push(DiagramAction::UpsertNode {
                id: slug(child),
                label: child.clone(),
                x: None,
                y: None,
                shape: NodeShape::Box,
            });
            actions.push(DiagramAction::UpsertEdge {
                id: format!("{}--{}", slug(root), slug(child)),
                from: slug(root),
                to: slug(child),
                label: None,
            });
        }
    }

    if let Some(order) = traversal_order(text, &sketch) {
        actions.push(DiagramAction::HighlightOrder { ids: order });
    }

    DiagramPatch {
        topic: sketch.roots.join(" & "),
        diagram_type: DiagramType::Tree,
        confidence: 1.0,
        actions,
        open_questions: Vec::new(),
        conflicts: Vec::new(),
        target_group_id: None,
    }
}

fn next_identifier<'a>(words: &[&'a str], from: usize) -> Option<&'a str> {
    words[from..]
        .iter()
        .take(3)
        .find(|w| is_identifier(w) && !is_stopword(w))
        .copied()
}

/// Honor "pre-order" / "post-order" / "in-order" directives over the first
/// root's children.
fn traversal_order(text: &str, sketch: &TreeSketch) -> Option<Vec<String>> {
    let lower = text.to_lowercase();
    let root = sketch.roots.first()?;
    let children: Vec<String> = sketch
        .children
        .get(root)
        .map(|c| c.iter().map(|l| slug(l)).collect())
        .unwrap_or_default();
    if children.is_empty() {
        return None;
    }
    let root_id = slug(root);

    if lower.contains("post-order") || lower.contains("postorder") {
        let mut order = children;
        order.push(root_id);
        Some(order)
    } else if lower.contains("in-order") || lower.contains("inorder") {
        let mut order = vec![children[0].clone(), root_id];
        order.extend(children.into_iter().skip(1));
        Some(order)
    } else if lower.contains("pre-order") || lower.contains("preorder") {
        let mut order = vec![root_id];
        order.extend(children);
        Some(order)
    } else {
        None
    }
}

// --- system blocks ----------------------------------------------------------

fn generate_system_blocks(text: &str) -> DiagramPatch {
    let mut actions = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for line in text.lines() {
        if !line.contains("->") {
            continue;
        }
        let chain: Vec<String> = line
            .split("->")
            .map(|part| {
                part.trim()
                    .split_whitespace()
                    .rev()
                    .find(|w| is_identifier(w))
                    .unwrap_or("")
                    .to_string()
            })
            .filter(|t| !t.is_empty())
            .collect();
        for token in &chain {
            if !seen.contains(token) {
                seen.push(token.clone());
                actions.push(DiagramAction::UpsertNode {
                    id: slug(token),
                    label: token.clone(),
                    x: None,
                    y: None,
                    shape: NodeShape::Box,
                });
            }
        }
        for pair in chain.windows(2) {
            actions.push(DiagramAction::UpsertEdge {
                id: format!("{}--{}", slug(&pair[0]), slug(&pair[1])),
                from: slug(&pair[0]),
                to: slug(&pair[1]),
                label: None,
            });
        }
    }

    // No explicit chain: fall back to the system vocabulary present in text.
    if seen.is_empty() {
        for cue in SYSTEM_CUES {
            if *cue != "->" && text.to_lowercase().contains(cue) && !seen.contains(&cue.to_string())
            {
                seen.push(cue.to_string());
                actions.push(DiagramAction::UpsertNode {
                    id: slug(cue),
                    label: cue.to_string(),
                    x: None,
                    y: None,
                    shape: NodeShape::Box,
                });
            }
        }
    }

    DiagramPatch {
        topic: seen.first().cloned().unwrap_or_else(|| "System".into()),
        diagram_type: DiagramType::SystemBlocks,
        confidence: 1.0,
        actions,
        open_questions: Vec::new(),
        conflicts: Vec::new(),
        target_group_id: None,
    }
}

// --- flowcharts -------------------------------------------------------------

fn generate_flowchart(lines: &[String]) -> DiagramPatch {
    let mut steps: Vec<String> = Vec::new();
    for line in lines {
        for phrase in line.split(['.', ';', ',']) {
            let phrase = phrase.trim();
            if phrase.is_empty() || phrase.chars().count() > 48 {
                continue;
            }
            if steps.len() >= 6 {
                break;
            }
            if !steps.iter().any(|s| s == phrase) {
                steps.push(phrase.to_string());
            }
        }
    }

    let mut actions = Vec::new();
    for step in &steps {
        actions.push(DiagramAction::UpsertNode {
            id: slug(step),
            label: step.clone(),
            x: None,
            y: None,
            shape: NodeShape::Box,
        });
    }
    for pair in steps.windows(2) {
        actions.push(DiagramAction::UpsertEdge {
            id: format!("{}--{}", slug(&pair[0]), slug(&pair[1])),
            from: slug(&pair[0]),
            to: slug(&pair[1]),
            label: None,
        });
    }

    DiagramPatch {
        topic: steps.first().cloned().unwrap_or_else(|| "Flow".into()),
        diagram_type: DiagramType::Flowchart,
        confidence: 1.0,
        actions,
        open_questions: Vec::new(),
        conflicts: Vec::new(),
        target_group_id: None,
    }
}
