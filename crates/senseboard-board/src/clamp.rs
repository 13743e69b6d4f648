//! Canvas bounds enforcement for AI-generated layouts.
//!
//! Providers occasionally place elements far outside the visible area or
//! produce degenerate sizes. `clamp_to_canvas` pulls every element back into
//! the AI content lane while preserving its size (up to the element
//! ceilings), clips polyline points into the lane, and bumps the revision
//! once iff anything moved. The pass is idempotent.

use crate::element::BoardElement;
use crate::state::BoardState;

pub const CANVAS_WIDTH: f64 = 2_400.0;
pub const CANVAS_HEIGHT: f64 = 1_350.0;
pub const CANVAS_PADDING: f64 = 48.0;
/// Horizontal inset of the AI content lane relative to the padded canvas.
pub const AI_LANE_INSET: f64 = 160.0;
pub const ELEMENT_MAX_WIDTH: f64 = 640.0;
pub const ELEMENT_MAX_HEIGHT: f64 = 480.0;

#[derive(Debug, Clone, Copy)]
struct Lane {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

fn lane() -> Lane {
    Lane {
        left: CANVAS_PADDING + AI_LANE_INSET,
        top: CANVAS_PADDING,
        right: CANVAS_WIDTH - CANVAS_PADDING - AI_LANE_INSET,
        bottom: CANVAS_HEIGHT - CANVAS_PADDING,
    }
}

/// Clamp every element into the AI lane. Returns the number of adjusted
/// elements; the board revision is bumped once iff that count is non-zero.
pub fn clamp_to_canvas(state: &mut BoardState, now: i64) -> usize {
    let lane = lane();
    let mut adjusted = 0usize;

    let ids: Vec<String> = state.order.clone();
    for id in &ids {
        let Some(element) = state.elements.get_mut(id) else {
            continue;
        };
        if clamp_element(element, lane) {
            adjusted += 1;
        }
    }

    if adjusted > 0 {
        state.revision += 1;
        state.last_updated_at = state.last_updated_at.max(now);
    }
    adjusted
}

fn clamp_element(element: &mut BoardElement, lane: Lane) -> bool {
    match element {
        BoardElement::Text(e) => {
            let (x, y) = (
                e.x.clamp(lane.left, lane.right),
                e.y.clamp(lane.top, lane.bottom),
            );
            let changed = x != e.x || y != e.y;
            e.x = x;
            e.y = y;
            changed
        }
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => clamp_box(
            &mut e.x,
            &mut e.y,
            &mut e.width,
            &mut e.height,
            lane,
        ),
        BoardElement::Sticky(e) => {
            clamp_box(&mut e.x, &mut e.y, &mut e.width, &mut e.height, lane)
        }
        BoardElement::Frame(e) => {
            clamp_box(&mut e.x, &mut e.y, &mut e.width, &mut e.height, lane)
        }
        BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
            let mut changed = false;
            for p in &mut e.points {
                let (x, y) = (
                    p.x.clamp(lane.left, lane.right),
                    p.y.clamp(lane.top, lane.bottom),
                );
                if x != p.x || y != p.y {
                    changed = true;
                }
                p.x = x;
                p.y = y;
            }
            changed
        }
    }
}

fn clamp_box(x: &mut f64, y: &mut f64, width: &mut f64, height: &mut f64, lane: Lane) -> bool {
    let mut changed = false;

    let w = width.min(ELEMENT_MAX_WIDTH).min(lane.right - lane.left);
    let h = height.min(ELEMENT_MAX_HEIGHT).min(lane.bottom - lane.top);
    if w != *width || h != *height {
        changed = true;
    }
    *width = w;
    *height = h;

    let nx = x.clamp(lane.left, lane.right - w);
    let ny = y.clamp(lane.top, lane.bottom - h);
    if nx != *x || ny != *y {
        changed = true;
    }
    *x = nx;
    *y = ny;

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Creator, ElementCommon, Point, PolylineElement, ShapeElement};
    use crate::ops::BoardOp;
    use crate::reducer::apply;

    fn rect(id: &str, x: f64, y: f64, w: f64, h: f64) -> BoardElement {
        BoardElement::Rect(ShapeElement {
            common: ElementCommon {
                id: id.to_string(),
                style: None,
                z: None,
                created_at: 0,
                created_by: Creator::Ai,
            },
            x,
            y,
            width: w,
            height: h,
            text: None,
        })
    }

    fn board_with(elements: Vec<BoardElement>) -> BoardState {
        let mut state = BoardState::new();
        for element in elements {
            apply(&mut state, BoardOp::UpsertElement { element }, 1);
        }
        state
    }

    #[test]
    fn out_of_lane_element_is_relocated() {
        let mut state = board_with(vec![rect("far", 100_000.0, -4_000.0, 160.0, 72.0)]);
        let adjusted = clamp_to_canvas(&mut state, 2);
        assert_eq!(adjusted, 1);

        let BoardElement::Rect(e) = state.get("far").unwrap() else {
            panic!("expected rect");
        };
        let lane = super::lane();
        assert!(e.x >= lane.left && e.x + e.width <= lane.right);
        assert!(e.y >= lane.top && e.y + e.height <= lane.bottom);
        // size preserved
        assert_eq!((e.width, e.height), (160.0, 72.0));
    }

    #[test]
    fn oversized_element_is_capped_not_dropped() {
        let mut state = board_with(vec![rect("huge", 300.0, 300.0, 5_000.0, 5_000.0)]);
        let before = state.len();
        clamp_to_canvas(&mut state, 2);
        assert_eq!(state.len(), before);
        let BoardElement::Rect(e) = state.get("huge").unwrap() else {
            panic!("expected rect");
        };
        assert_eq!(e.width, ELEMENT_MAX_WIDTH);
        assert_eq!(e.height, ELEMENT_MAX_HEIGHT);
    }

    #[test]
    fn polyline_points_are_clipped() {
        let mut state = board_with(vec![BoardElement::Arrow(PolylineElement {
            common: ElementCommon {
                id: "a".into(),
                style: None,
                z: None,
                created_at: 0,
                created_by: Creator::Ai,
            },
            points: vec![
                Point { x: -900.0, y: 0.0 },
                Point { x: 400.0, y: 400.0 },
            ],
        })]);
        clamp_to_canvas(&mut state, 2);
        let BoardElement::Arrow(e) = state.get("a").unwrap() else {
            panic!("expected arrow");
        };
        let lane = super::lane();
        for p in &e.points {
            assert!(p.x >= lane.left && p.x <= lane.right);
            assert!(p.y >= lane.top && p.y <= lane.bottom);
        }
    }

    #[test]
    fn clamp_is_idempotent_and_bumps_once() {
        let mut state = board_with(vec![rect("far", 90_000.0, 90_000.0, 100.0, 100.0)]);
        let rev_before = state.revision;
        let first = clamp_to_canvas(&mut state, 2);
        assert_eq!(first, 1);
        assert_eq!(state.revision, rev_before + 1);

        let snapshot = state.clone();
        let second = clamp_to_canvas(&mut state, 3);
        assert_eq!(second, 0);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn in_lane_board_is_untouched() {
        let mut state = board_with(vec![rect("ok", 400.0, 200.0, 160.0, 72.0)]);
        let rev = state.revision;
        assert_eq!(clamp_to_canvas(&mut state, 2), 0);
        assert_eq!(state.revision, rev);
    }
}
