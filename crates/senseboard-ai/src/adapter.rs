//! `DiagramPatch` → `BoardOp` adapter.
//!
//! The fallback engine path produces the legacy action stream; this module
//! lowers it into reducer ops so both paths share one mutation vocabulary.
//! Node ids are translated through a stable `sense-…-hash` key scheme so
//! AI elements can never collide with client-created ids, and every
//! AI-created element absent from the new patch is deleted to prevent stale
//! leftovers.

use std::collections::HashMap;

use senseboard_board::{
    BoardElement, BoardOp, Creator, ElementCommon, ElementStyle, Point, PolylineElement,
    ShapeElement, StickyElement, TextElement,
};

use crate::fingerprint::fnv1a;
use crate::patch::{DiagramAction, DiagramPatch, DiagramType, LayoutDirection, NodeShape};

const NODE_WIDTH: f64 = 160.0;
const NODE_HEIGHT: f64 = 72.0;
const COLUMN_STEP: f64 = 220.0;
const ROW_STEP: f64 = 140.0;
const LANE_ORIGIN_X: f64 = 260.0;
const LANE_ORIGIN_Y: f64 = 140.0;
const HIGHLIGHT_COLOR: &str = "#f59e0b";

pub const TITLE_ELEMENT_ID: &str = "sense-title";
pub const NOTES_ELEMENT_ID: &str = "notes:main";
pub const ORDER_ELEMENT_ID: &str = "order:main";

/// Stable board id for a patch shape id.
pub fn board_id(patch_id: &str) -> String {
    format!("sense-{}-{:08x}", patch_id, fnv1a(patch_id.as_bytes()) as u32)
}

fn edge_board_id(edge_id: &str) -> String {
    format!("sense-edge-{:08x}", fnv1a(edge_id.as_bytes()) as u32)
}

struct NodeSpec {
    id: String,
    label: String,
    explicit: Option<(f64, f64)>,
    shape: NodeShape,
}

/// Convert a patch into reducer ops against the given board.
///
/// `existing_ai_ids` are the AI-created element ids currently on the target
/// board; `seed` drives the deterministic layout jitter.
pub fn adapt_patch(
    patch: &DiagramPatch,
    existing_ai_ids: &[String],
    seed: u64,
    now: i64,
) -> Vec<BoardOp> {
    let mut nodes: Vec<NodeSpec> = Vec::new();
    let mut edges: Vec<(String, String, String)> = Vec::new();
    let mut deletes: Vec<String> = Vec::new();
    let mut title: Option<String> = None;
    let mut notes: Option<Vec<String>> = None;
    let mut highlight: Option<Vec<String>> = None;
    let mut direction = match patch.diagram_type {
        DiagramType::Tree => LayoutDirection::Tree,
        DiagramType::SystemBlocks => LayoutDirection::LeftToRight,
        DiagramType::Flowchart => LayoutDirection::TopDown,
    };

    for action in &patch.actions {
        match action {
            DiagramAction::UpsertNode {
                id,
                label,
                x,
                y,
                shape,
            } => {
                if !nodes.iter().any(|n| &n.id == id) {
                    nodes.push(NodeSpec {
                        id: id.clone(),
                        label: label.clone(),
                        explicit: (*x).zip(*y),
                        shape: *shape,
                    });
                }
            }
            DiagramAction::UpsertEdge { id, from, to, .. } => {
                edges.push((id.clone(), from.clone(), to.clone()));
            }
            DiagramAction::DeleteShape { id } => deletes.push(board_id(id)),
            DiagramAction::SetTitle { text } => title = Some(text.clone()),
            DiagramAction::SetNotes { lines } => notes = Some(lines.clone()),
            DiagramAction::HighlightOrder { ids } => highlight = Some(ids.clone()),
            DiagramAction::LayoutHint { direction: d } => direction = *d,
        }
    }

    let positions = layout(&nodes, &edges, direction, seed);
    let mut ops: Vec<BoardOp> = Vec::new();
    let mut emitted: Vec<String> = Vec::new();

    for node in &nodes {
        let (x, y) = node
            .explicit
            .or_else(|| positions.get(&node.id).copied())
            .unwrap_or((LANE_ORIGIN_X, LANE_ORIGIN_Y));
        let id = board_id(&node.id);
        let common = ElementCommon {
            id: id.clone(),
            style: None,
            z: None,
            created_at: now,
            created_by: Creator::Ai,
        };
        let shape = ShapeElement {
            common,
            x,
            y,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
            text: Some(node.label.clone()),
        };
        let element = match (node.shape, patch.diagram_type) {
            (NodeShape::Diamond, DiagramType::Tree) => BoardElement::Ellipse(shape),
            (NodeShape::Diamond, _) => BoardElement::Diamond(shape),
            _ => BoardElement::Rect(shape),
        };
        emitted.push(id);
        ops.push(BoardOp::UpsertElement { element });
    }

    for (edge_id, from, to) in &edges {
        let (Some(from_pos), Some(to_pos)) = (
            node_center(&nodes, &positions, from),
            node_center(&nodes, &positions, to),
        ) else {
            continue;
        };
        let id = edge_board_id(edge_id);
        emitted.push(id.clone());
        ops.push(BoardOp::UpsertElement {
            element: BoardElement::Arrow(PolylineElement {
                common: ElementCommon {
                    id,
                    style: None,
                    z: None,
                    created_at: now,
                    created_by: Creator::Ai,
                },
                points: vec![
                    Point {
                        x: from_pos.0,
                        y: from_pos.1,
                    },
                    Point {
                        x: to_pos.0,
                        y: to_pos.1,
                    },
                ],
            }),
        });
    }

    if let Some(text) = title {
        emitted.push(TITLE_ELEMENT_ID.to_string());
        ops.push(BoardOp::UpsertElement {
            element: BoardElement::Sticky(StickyElement {
                common: ElementCommon {
                    id: TITLE_ELEMENT_ID.to_string(),
                    style: None,
                    z: Some(10),
                    created_at: now,
                    created_by: Creator::Ai,
                },
                x: LANE_ORIGIN_X,
                y: LANE_ORIGIN_Y - 80.0,
                width: 360.0,
                height: 56.0,
                text,
            }),
        });
    }

    if let Some(lines) = notes {
        emitted.push(NOTES_ELEMENT_ID.to_string());
        ops.push(BoardOp::UpsertElement {
            element: BoardElement::Text(TextElement {
                common: ElementCommon {
                    id: NOTES_ELEMENT_ID.to_string(),
                    style: None,
                    z: Some(5),
                    created_at: now,
                    created_by: Creator::Ai,
                },
                x: LANE_ORIGIN_X,
                y: LANE_ORIGIN_Y + 520.0,
                text: lines.join("; "),
            }),
        });
    }

    if let Some(order) = highlight {
        let mut labels = Vec::new();
        for patch_id in &order {
            let id = board_id(patch_id);
            if emitted.contains(&id) {
                ops.push(BoardOp::SetElementStyle {
                    id,
                    style: ElementStyle {
                        stroke_color: Some(HIGHLIGHT_COLOR.to_string()),
                        stroke_width: Some(3.0),
                        ..Default::default()
                    },
                });
            }
            let label = nodes
                .iter()
                .find(|n| &n.id == patch_id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| patch_id.clone());
            labels.push(label);
        }
        emitted.push(ORDER_ELEMENT_ID.to_string());
        ops.push(BoardOp::UpsertElement {
            element: BoardElement::Text(TextElement {
                common: ElementCommon {
                    id: ORDER_ELEMENT_ID.to_string(),
                    style: Some(ElementStyle {
                        stroke_color: Some(HIGHLIGHT_COLOR.to_string()),
                        ..Default::default()
                    }),
                    z: Some(5),
                    created_at: now,
                    created_by: Creator::Ai,
                },
                x: LANE_ORIGIN_X,
                y: LANE_ORIGIN_Y + 460.0,
                text: format!("Order: {}", labels.join(" \u{2192} ")),
            }),
        });
    }

    for id in &deletes {
        ops.push(BoardOp::DeleteElement { id: id.clone() });
    }

    // Stale cleanup: anything the AI drew before that this patch no longer
    // mentions gets removed.
    for id in existing_ai_ids {
        if !emitted.contains(id) && !deletes.contains(id) {
            ops.push(BoardOp::DeleteElement { id: id.clone() });
        }
    }

    ops
}

fn node_center(
    nodes: &[NodeSpec],
    positions: &HashMap<String, (f64, f64)>,
    id: &str,
) -> Option<(f64, f64)> {
    let node = nodes.iter().find(|n| n.id == id)?;
    let (x, y) = node.explicit.or_else(|| positions.get(id).copied())?;
    Some((x + NODE_WIDTH / 2.0, y + NODE_HEIGHT / 2.0))
}

/// Deterministic coordinates for nodes without explicit positions. The seed
/// shifts the whole layout a few pixels so repeated regenerations don't pile
/// up pixel-identically, without ever reordering anything.
fn layout(
    nodes: &[NodeSpec],
    edges: &[(String, String, String)],
    direction: LayoutDirection,
    seed: u64,
) -> HashMap<String, (f64, f64)> {
    let jitter = (seed % 33) as f64 - 16.0;
    let origin_x = LANE_ORIGIN_X + jitter;
    let origin_y = LANE_ORIGIN_Y + jitter / 2.0;
    let mut positions = HashMap::new();

    match direction {
        LayoutDirection::Tree => {
            // BFS levels from the roots (nodes nothing points at).
            let mut level: HashMap<String, usize> = HashMap::new();
            let roots: Vec<&NodeSpec> = nodes
                .iter()
                .filter(|n| !edges.iter().any(|(_, _, to)| to == &n.id))
                .collect();
            for root in &roots {
                assign_levels(&root.id, 0, edges, &mut level);
            }
            let mut per_level_count: HashMap<usize, usize> = HashMap::new();
            for node in nodes {
                let depth = level.get(node.id.as_str()).copied().unwrap_or(0);
                let index = per_level_count.entry(depth).or_insert(0);
                positions.insert(
                    node.id.clone(),
                    (
                        origin_x + *index as f64 * COLUMN_STEP,
                        origin_y + depth as f64 * ROW_STEP,
                    ),
                );
                *index += 1;
            }
        }
        LayoutDirection::LeftToRight => {
            for (i, node) in nodes.iter().enumerate() {
                positions.insert(
                    node.id.clone(),
                    (origin_x + i as f64 * COLUMN_STEP, origin_y + 200.0),
                );
            }
        }
        LayoutDirection::TopDown => {
            for (i, node) in nodes.iter().enumerate() {
                positions.insert(
                    node.id.clone(),
                    (origin_x, origin_y + i as f64 * (ROW_STEP - 10.0)),
                );
            }
        }
    }
    positions
}

fn assign_levels(
    id: &str,
    depth: usize,
    edges: &[(String, String, String)],
    level: &mut HashMap<String, usize>,
) {
    // Recursion guard; provider graphs are tiny and may contain cycles.
    if depth > 32 {
        return;
    }
    if let Some(existing) = level.get(id) {
        if *existing <= depth {
            return;
        }
    }
    level.insert(id.to_string(), depth);
    for (_, from, to) in edges {
        if from == id {
            assign_levels(to, depth + 1, edges, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deterministic;
    use senseboard_board::{apply_all, BoardState};

    fn tree_patch() -> DiagramPatch {
        deterministic::generate(&[
            "tree with root A".to_string(),
            "children B and C".to_string(),
        ])
    }

    fn apply_to_fresh_board(ops: Vec<BoardOp>) -> BoardState {
        let mut board = BoardState::new();
        apply_all(&mut board, ops, 1);
        board
    }

    #[test]
    fn nodes_become_rects_and_edges_become_arrows() {
        let ops = adapt_patch(&tree_patch(), &[], 7, 1);
        let board = apply_to_fresh_board(ops);

        let rects: Vec<_> = board
            .iter_ordered()
            .filter(|el| el.kind() == "rect")
            .collect();
        let arrows: Vec<_> = board
            .iter_ordered()
            .filter(|el| el.kind() == "arrow")
            .collect();
        assert!(rects.len() >= 3, "want >=3 rects, got {}", rects.len());
        assert!(arrows.len() >= 2, "want >=2 arrows, got {}", arrows.len());

        let texts: Vec<String> = rects
            .iter()
            .filter_map(|el| match el {
                BoardElement::Rect(e) => e.text.clone(),
                _ => None,
            })
            .map(|t| t.trim().to_uppercase())
            .collect();
        for expected in ["A", "B", "C"] {
            assert!(texts.contains(&expected.to_string()), "{texts:?}");
        }
    }

    #[test]
    fn every_adapted_element_is_ai_created_with_sense_ids() {
        let ops = adapt_patch(&tree_patch(), &[], 7, 1);
        let board = apply_to_fresh_board(ops);
        for el in board.iter_ordered() {
            assert_eq!(el.common().created_by, Creator::Ai);
            assert!(
                el.id().starts_with("sense-")
                    || el.id().starts_with("notes:")
                    || el.id().starts_with("order:"),
                "unexpected id {}",
                el.id()
            );
        }
    }

    #[test]
    fn stale_ai_elements_are_deleted() {
        let patch = tree_patch();
        let stale = vec!["sense-old-deadbeef".to_string()];
        let ops = adapt_patch(&patch, &stale, 7, 1);
        assert!(ops.iter().any(
            |op| matches!(op, BoardOp::DeleteElement { id } if id == "sense-old-deadbeef")
        ));
    }

    #[test]
    fn surviving_ids_are_not_deleted() {
        let patch = tree_patch();
        let keep = board_id("a");
        let ops = adapt_patch(&patch, std::slice::from_ref(&keep), 7, 1);
        assert!(!ops
            .iter()
            .any(|op| matches!(op, BoardOp::DeleteElement { id } if id == &keep)));
    }

    #[test]
    fn highlight_emits_styles_and_order_text() {
        let patch = deterministic::generate(&[
            "tree with root A, children B and C".to_string(),
            "walk it post-order".to_string(),
        ]);
        let ops = adapt_patch(&patch, &[], 7, 1);
        let style_count = ops
            .iter()
            .filter(|op| matches!(op, BoardOp::SetElementStyle { .. }))
            .count();
        assert_eq!(style_count, 3);

        let board = apply_to_fresh_board(ops);
        let order_text = board.get(ORDER_ELEMENT_ID).unwrap();
        let BoardElement::Text(text) = order_text else {
            panic!("order element should be text");
        };
        assert!(text.text.starts_with("Order: "), "{}", text.text);
        assert!(text.text.contains('\u{2192}'));
    }

    #[test]
    fn layout_is_deterministic_per_seed() {
        let patch = tree_patch();
        assert_eq!(adapt_patch(&patch, &[], 9, 1), adapt_patch(&patch, &[], 9, 1));
        assert_ne!(adapt_patch(&patch, &[], 9, 1), adapt_patch(&patch, &[], 10, 1));
    }

    #[test]
    fn children_sit_one_level_below_the_root() {
        let ops = adapt_patch(&tree_patch(), &[], 0, 1);
        let board = apply_to_fresh_board(ops);
        let y_of = |patch_id: &str| {
            let BoardElement::Rect(e) = board.get(&board_id(patch_id)).unwrap() else {
                panic!("expected rect");
            };
            e.y
        };
        assert!(y_of("b") > y_of("a"));
        assert!((y_of("b") - y_of("c")).abs() < 1e-9);
    }
}
