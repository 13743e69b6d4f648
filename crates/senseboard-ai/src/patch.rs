use serde::{Deserialize, Serialize};

/// Coarse diagram classification driving the layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    Flowchart,
    SystemBlocks,
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeShape {
    #[default]
    Box,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    TopDown,
    LeftToRight,
    Tree,
}

/// Legacy higher-level action stream, retained as the fallback
/// representation. Adapted to `BoardOp`s by [`crate::adapter::adapt_patch`]
/// before anything touches the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramPatch {
    pub topic: String,
    pub diagram_type: DiagramType,
    /// Provider self-assessment in [0, 1]; drives the revision loop.
    pub confidence: f64,
    pub actions: Vec<DiagramAction>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_id: Option<String>,
}

impl DiagramPatch {
    pub fn clamped_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Node and edge count — a patch with neither draws nothing.
    pub fn is_renderable(&self) -> bool {
        self.actions.iter().any(|a| {
            matches!(
                a,
                DiagramAction::UpsertNode { .. } | DiagramAction::UpsertEdge { .. }
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DiagramAction {
    UpsertNode {
        id: String,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default)]
        shape: NodeShape,
    },
    UpsertEdge {
        id: String,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    DeleteShape {
        id: String,
    },
    SetTitle {
        text: String,
    },
    SetNotes {
        lines: Vec<String>,
    },
    HighlightOrder {
        ids: Vec<String>,
    },
    LayoutHint {
        direction: LayoutDirection,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_round_trips_with_camel_case() {
        let patch = DiagramPatch {
            topic: "Auth flow".into(),
            diagram_type: DiagramType::Flowchart,
            confidence: 0.9,
            actions: vec![
                DiagramAction::UpsertNode {
                    id: "login".into(),
                    label: "Login".into(),
                    x: None,
                    y: None,
                    shape: NodeShape::Box,
                },
                DiagramAction::UpsertEdge {
                    id: "e1".into(),
                    from: "login".into(),
                    to: "token".into(),
                    label: None,
                },
            ],
            open_questions: vec![],
            conflicts: vec![],
            target_group_id: None,
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains(r#""diagramType":"flowchart""#));
        assert!(json.contains(r#""kind":"upsertNode""#));
        let back: DiagramPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch);
    }

    #[test]
    fn renderability_requires_nodes_or_edges() {
        let mut patch = DiagramPatch {
            topic: "t".into(),
            diagram_type: DiagramType::Tree,
            confidence: 1.0,
            actions: vec![DiagramAction::SetTitle { text: "T".into() }],
            open_questions: vec![],
            conflicts: vec![],
            target_group_id: None,
        };
        assert!(!patch.is_renderable());
        patch.actions.push(DiagramAction::UpsertNode {
            id: "a".into(),
            label: "A".into(),
            x: None,
            y: None,
            shape: NodeShape::Box,
        });
        assert!(patch.is_renderable());
    }

    #[test]
    fn confidence_is_clamped() {
        let patch = DiagramPatch {
            topic: "t".into(),
            diagram_type: DiagramType::Tree,
            confidence: f64::NAN,
            actions: vec![],
            open_questions: vec![],
            conflicts: vec![],
            target_group_id: None,
        };
        assert_eq!(patch.clamped_confidence(), 0.0);
    }
}
