use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::BoardElement;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// The authoritative canvas state for one board.
///
/// Invariants maintained by the reducer:
/// - every id in `order` appears exactly once and maps to an element, and
///   every element id appears in `order`
/// - `revision` strictly increases on any accepted mutation
/// - `last_updated_at` never decreases
/// - element count never exceeds [`crate::MAX_ELEMENTS`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    pub elements: HashMap<String, BoardElement>,
    pub order: Vec<String>,
    pub revision: u64,
    pub last_updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl BoardState {
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            order: Vec::new(),
            revision: 0,
            last_updated_at: 0,
            viewport: None,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&BoardElement> {
        self.elements.get(id)
    }

    /// Elements in display order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &BoardElement> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Ids of every AI-created element, in display order.
    pub fn ai_element_ids(&self) -> Vec<String> {
        self.iter_ordered()
            .filter(|el| el.common().created_by == crate::element::Creator::Ai)
            .map(|el| el.id().to_string())
            .collect()
    }
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Creator, ElementCommon, TextElement};

    #[test]
    fn snapshot_field_names_are_camel_case() {
        let state = BoardState::new();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""lastUpdatedAt":0"#));
        assert!(json.contains(r#""revision":0"#));
    }

    #[test]
    fn ai_element_ids_filters_by_creator() {
        let mut state = BoardState::new();
        for (id, creator) in [("a", Creator::Ai), ("b", Creator::System)] {
            state.elements.insert(
                id.to_string(),
                BoardElement::Text(TextElement {
                    common: ElementCommon {
                        id: id.to_string(),
                        style: None,
                        z: None,
                        created_at: 0,
                        created_by: creator,
                    },
                    x: 0.0,
                    y: 0.0,
                    text: "x".into(),
                }),
            );
            state.order.push(id.to_string());
        }
        assert_eq!(state.ai_element_ids(), vec!["a".to_string()]);
    }
}
