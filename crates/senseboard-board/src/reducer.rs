//! Pure board reducer.
//!
//! `apply(state, op, now)` sanitizes the op, mutates the state when the op
//! is valid, and reports what happened. Invalid ops are recorded as rejected
//! ids and leave `revision` and `last_updated_at` untouched. The reducer
//! never panics and never returns an error.

use crate::element::{BoardElement, Bounds, ElementStyle, Point};
use crate::ops::{AlignAxis, BoardOp, DistributeAxis};
use crate::state::{BoardState, Viewport};
use crate::{
    FONT_SIZE_RANGE, MAX_APPEND_POINTS, MAX_COORD, MAX_ELEMENTS, MAX_POINTS, MAX_TEXT_LEN,
    ROUGHNESS_RANGE, STROKE_WIDTH_RANGE,
};

/// Result of one reducer call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// True when the state was mutated (and `revision` bumped).
    pub changed: bool,
    /// Ids (or op labels for id-less ops) that were refused.
    pub rejected: Vec<String>,
}

impl Applied {
    fn rejected(label: impl Into<String>) -> Self {
        Self {
            changed: false,
            rejected: vec![label.into()],
        }
    }

    fn changed() -> Self {
        Self {
            changed: true,
            rejected: Vec::new(),
        }
    }

    fn noop() -> Self {
        Self::default()
    }

    fn absorb(&mut self, other: Applied) {
        self.changed |= other.changed;
        self.rejected.extend(other.rejected);
    }
}

/// Apply a single op. Bumps `revision` exactly once when anything changed.
pub fn apply(state: &mut BoardState, op: BoardOp, now: i64) -> Applied {
    let result = apply_inner(state, op, now);
    if result.changed {
        bump(state, now);
    }
    result
}

/// Apply a slice of ops in order. Each accepted op bumps the revision, so a
/// fully accepted batch of N ops raises `revision` by N.
pub fn apply_all(state: &mut BoardState, ops: Vec<BoardOp>, now: i64) -> Applied {
    let mut total = Applied::noop();
    for op in ops {
        total.absorb(apply(state, op, now));
    }
    total
}

fn bump(state: &mut BoardState, now: i64) {
    state.revision += 1;
    state.last_updated_at = state.last_updated_at.max(now);
}

fn apply_inner(state: &mut BoardState, op: BoardOp, now: i64) -> Applied {
    match op {
        BoardOp::UpsertElement { element } => upsert(state, element),
        BoardOp::DeleteElement { id } => delete(state, &id),
        BoardOp::AppendStrokePoints { id, points } => append_stroke(state, &id, points),
        BoardOp::OffsetElement { id, dx, dy } => offset(state, &id, dx, dy),
        BoardOp::SetElementGeometry {
            id,
            x,
            y,
            width,
            height,
        } => set_geometry(state, &id, x, y, width, height),
        BoardOp::SetElementStyle { id, style } => set_style(state, &id, style),
        BoardOp::SetElementText { id, text } => set_text(state, &id, &text),
        BoardOp::DuplicateElement {
            id,
            new_id,
            dx,
            dy,
        } => duplicate(state, &id, &new_id, dx, dy, now),
        BoardOp::SetElementZIndex { id, z } => set_z(state, &id, z),
        BoardOp::AlignElements { ids, axis } => align(state, &ids, axis),
        BoardOp::DistributeElements { ids, axis, gap } => distribute(state, &ids, axis, gap),
        BoardOp::ClearBoard => clear(state),
        BoardOp::SetViewport { viewport } => set_viewport(state, viewport),
        BoardOp::Batch { ops } => {
            let mut total = Applied::noop();
            for inner in ops {
                total.absorb(apply_inner(state, inner, now));
            }
            total
        }
    }
}

// --- sanitization -----------------------------------------------------------

fn clamp_coord(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-MAX_COORD, MAX_COORD)
    } else {
        0.0
    }
}

fn clamp_size(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(1.0, MAX_COORD)
    } else {
        1.0
    }
}

fn clamp_range(v: f64, range: (f64, f64)) -> f64 {
    if v.is_finite() {
        v.clamp(range.0, range.1)
    } else {
        range.0
    }
}

/// Collapse unicode whitespace runs to single spaces, trim, truncate.
pub fn sanitize_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_LEN).collect()
}

fn sanitize_point(p: Point) -> Point {
    Point {
        x: clamp_coord(p.x),
        y: clamp_coord(p.y),
    }
}

fn sanitize_points(points: Vec<Point>, cap: usize) -> Vec<Point> {
    points.into_iter().take(cap).map(sanitize_point).collect()
}

fn sanitize_style(style: &mut ElementStyle) {
    if let Some(w) = style.stroke_width {
        style.stroke_width = Some(clamp_range(w, STROKE_WIDTH_RANGE));
    }
    if let Some(r) = style.roughness {
        style.roughness = Some(clamp_range(r, ROUGHNESS_RANGE));
    }
    if let Some(f) = style.font_size {
        style.font_size = Some(clamp_range(f, FONT_SIZE_RANGE));
    }
}

fn sanitize_element(element: &mut BoardElement) {
    if let Some(style) = &mut element.common_mut().style {
        sanitize_style(style);
        if style.is_empty() {
            element.common_mut().style = None;
        }
    }
    match element {
        BoardElement::Text(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
            e.text = sanitize_text(&e.text);
        }
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
            e.width = clamp_size(e.width);
            e.height = clamp_size(e.height);
            if let Some(text) = &e.text {
                e.text = Some(sanitize_text(text));
            }
        }
        BoardElement::Sticky(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
            e.width = clamp_size(e.width);
            e.height = clamp_size(e.height);
            e.text = sanitize_text(&e.text);
        }
        BoardElement::Frame(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
            e.width = clamp_size(e.width);
            e.height = clamp_size(e.height);
            if let Some(title) = &e.title {
                e.title = Some(sanitize_text(title));
            }
        }
        BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
            e.points = sanitize_points(std::mem::take(&mut e.points), MAX_POINTS);
        }
    }
}

// --- op handlers ------------------------------------------------------------

fn upsert(state: &mut BoardState, mut element: BoardElement) -> Applied {
    sanitize_element(&mut element);
    let id = element.id().to_string();
    if id.trim().is_empty() {
        return Applied::rejected("upsertElement");
    }
    let exists = state.elements.contains_key(&id);
    if !exists && state.len() >= MAX_ELEMENTS {
        return Applied::rejected(id);
    }
    state.elements.insert(id.clone(), element);
    if !exists {
        state.order.push(id);
    }
    Applied::changed()
}

fn delete(state: &mut BoardState, id: &str) -> Applied {
    if state.elements.remove(id).is_none() {
        return Applied::rejected(id);
    }
    state.order.retain(|existing| existing != id);
    Applied::changed()
}

fn append_stroke(state: &mut BoardState, id: &str, points: Vec<Point>) -> Applied {
    let Some(BoardElement::Stroke(stroke)) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    let fresh = sanitize_points(points, MAX_APPEND_POINTS);
    if fresh.is_empty() {
        return Applied::rejected(id);
    }
    stroke.points.extend(fresh);
    stroke.points.truncate(MAX_POINTS);
    Applied::changed()
}

fn offset(state: &mut BoardState, id: &str, dx: f64, dy: f64) -> Applied {
    let Some(element) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
        return Applied::rejected(id);
    }
    element.translate(dx, dy);
    clamp_position(element);
    Applied::changed()
}

/// Re-clamp an element's coordinates after a translation.
fn clamp_position(element: &mut BoardElement) {
    match element {
        BoardElement::Text(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
        }
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
        }
        BoardElement::Sticky(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
        }
        BoardElement::Frame(e) => {
            e.x = clamp_coord(e.x);
            e.y = clamp_coord(e.y);
        }
        BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
            for p in &mut e.points {
                *p = sanitize_point(*p);
            }
        }
    }
}

fn set_geometry(
    state: &mut BoardState,
    id: &str,
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
) -> Applied {
    let Some(element) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    if x.is_none() && y.is_none() && width.is_none() && height.is_none() {
        return Applied::rejected(id);
    }

    fn apply_box(
        ex: &mut f64,
        ey: &mut f64,
        ew: &mut f64,
        eh: &mut f64,
        x: Option<f64>,
        y: Option<f64>,
        w: Option<f64>,
        h: Option<f64>,
    ) {
        if let Some(v) = x {
            *ex = clamp_coord(v);
        }
        if let Some(v) = y {
            *ey = clamp_coord(v);
        }
        if let Some(v) = w {
            *ew = clamp_size(v);
        }
        if let Some(v) = h {
            *eh = clamp_size(v);
        }
    }

    match element {
        BoardElement::Text(e) => {
            // Text has no box; width/height requests are meaningless.
            if x.is_none() && y.is_none() {
                return Applied::rejected(id);
            }
            if let Some(v) = x {
                e.x = clamp_coord(v);
            }
            if let Some(v) = y {
                e.y = clamp_coord(v);
            }
        }
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => {
            apply_box(&mut e.x, &mut e.y, &mut e.width, &mut e.height, x, y, width, height)
        }
        BoardElement::Sticky(e) => {
            apply_box(&mut e.x, &mut e.y, &mut e.width, &mut e.height, x, y, width, height)
        }
        BoardElement::Frame(e) => {
            apply_box(&mut e.x, &mut e.y, &mut e.width, &mut e.height, x, y, width, height)
        }
        BoardElement::Stroke(_) | BoardElement::Line(_) | BoardElement::Arrow(_) => {
            return Applied::rejected(id);
        }
    }
    Applied::changed()
}

fn set_style(state: &mut BoardState, id: &str, mut patch: ElementStyle) -> Applied {
    let Some(element) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    sanitize_style(&mut patch);
    if patch.is_empty() {
        return Applied::rejected(id);
    }
    let common = element.common_mut();
    match &mut common.style {
        Some(existing) => existing.merge(&patch),
        None => common.style = Some(patch),
    }
    Applied::changed()
}

fn set_text(state: &mut BoardState, id: &str, text: &str) -> Applied {
    let Some(element) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    let clean = sanitize_text(text);
    match element {
        BoardElement::Text(e) => e.text = clean,
        BoardElement::Rect(e)
        | BoardElement::Ellipse(e)
        | BoardElement::Diamond(e)
        | BoardElement::Triangle(e) => e.text = Some(clean),
        BoardElement::Sticky(e) => e.text = clean,
        BoardElement::Frame(e) => e.title = Some(clean),
        BoardElement::Stroke(_) | BoardElement::Line(_) | BoardElement::Arrow(_) => {
            return Applied::rejected(id);
        }
    }
    Applied::changed()
}

fn duplicate(
    state: &mut BoardState,
    id: &str,
    new_id: &str,
    dx: f64,
    dy: f64,
    now: i64,
) -> Applied {
    if new_id.trim().is_empty() || state.elements.contains_key(new_id) {
        return Applied::rejected(new_id);
    }
    if state.len() >= MAX_ELEMENTS {
        return Applied::rejected(new_id);
    }
    let Some(source) = state.elements.get(id) else {
        return Applied::rejected(id);
    };
    let mut clone = source.clone();
    clone.common_mut().id = new_id.to_string();
    clone.common_mut().created_at = now;
    if dx.is_finite() && dy.is_finite() {
        clone.translate(dx, dy);
    }
    clamp_position(&mut clone);
    state.elements.insert(new_id.to_string(), clone);
    state.order.push(new_id.to_string());
    Applied::changed()
}

fn set_z(state: &mut BoardState, id: &str, z: i32) -> Applied {
    let Some(element) = state.elements.get_mut(id) else {
        return Applied::rejected(id);
    };
    if element.common().z == Some(z) {
        return Applied::rejected(id);
    }
    element.common_mut().z = Some(z);
    Applied::changed()
}

fn align(state: &mut BoardState, ids: &[String], axis: AlignAxis) -> Applied {
    let renderable: Vec<(String, Bounds)> = ids
        .iter()
        .filter_map(|id| {
            state
                .elements
                .get(id)
                .and_then(|el| el.bounds())
                .map(|b| (id.clone(), b))
        })
        .collect();
    if renderable.len() < 2 {
        return Applied::rejected("alignElements");
    }

    let target = anchor(&renderable[0].1, axis);
    let mut moved = false;
    for (id, bounds) in &renderable {
        let delta = target - anchor(bounds, axis);
        if delta == 0.0 {
            continue;
        }
        let (dx, dy) = match axis {
            AlignAxis::Left | AlignAxis::CenterX | AlignAxis::Right => (delta, 0.0),
            AlignAxis::Top | AlignAxis::CenterY | AlignAxis::Bottom => (0.0, delta),
        };
        if let Some(element) = state.elements.get_mut(id) {
            element.translate(dx, dy);
            clamp_position(element);
            moved = true;
        }
    }
    if moved {
        Applied::changed()
    } else {
        Applied::noop()
    }
}

fn anchor(bounds: &Bounds, axis: AlignAxis) -> f64 {
    match axis {
        AlignAxis::Left => bounds.x,
        AlignAxis::CenterX => bounds.center_x(),
        AlignAxis::Right => bounds.right(),
        AlignAxis::Top => bounds.y,
        AlignAxis::CenterY => bounds.center_y(),
        AlignAxis::Bottom => bounds.bottom(),
    }
}

fn distribute(
    state: &mut BoardState,
    ids: &[String],
    axis: DistributeAxis,
    gap: Option<f64>,
) -> Applied {
    let mut renderable: Vec<(String, Bounds)> = ids
        .iter()
        .filter_map(|id| {
            state
                .elements
                .get(id)
                .and_then(|el| el.bounds())
                .map(|b| (id.clone(), b))
        })
        .collect();
    if renderable.len() < 3 {
        return Applied::rejected("distributeElements");
    }

    let centroid = |b: &Bounds| match axis {
        DistributeAxis::Horizontal => b.center_x(),
        DistributeAxis::Vertical => b.center_y(),
    };
    renderable.sort_by(|a, b| {
        centroid(&a.1)
            .partial_cmp(&centroid(&b.1))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let first = centroid(&renderable[0].1);
    let last = centroid(&renderable[renderable.len() - 1].1);
    let step = match gap {
        Some(g) if g.is_finite() && g > 0.0 => g,
        _ => (last - first) / (renderable.len() as f64 - 1.0),
    };

    // Endpoints stay put; interior elements walk out from the first centroid.
    let mut moved = false;
    for (index, (id, bounds)) in renderable
        .iter()
        .enumerate()
        .take(renderable.len() - 1)
        .skip(1)
    {
        let target = first + step * index as f64;
        let delta = target - centroid(bounds);
        if delta == 0.0 {
            continue;
        }
        let (dx, dy) = match axis {
            DistributeAxis::Horizontal => (delta, 0.0),
            DistributeAxis::Vertical => (0.0, delta),
        };
        if let Some(element) = state.elements.get_mut(id) {
            element.translate(dx, dy);
            clamp_position(element);
            moved = true;
        }
    }
    if moved {
        Applied::changed()
    } else {
        Applied::noop()
    }
}

fn clear(state: &mut BoardState) -> Applied {
    if state.is_empty() {
        return Applied::noop();
    }
    state.elements.clear();
    state.order.clear();
    Applied::changed()
}

fn set_viewport(state: &mut BoardState, viewport: Viewport) -> Applied {
    let clean = Viewport {
        x: clamp_coord(viewport.x),
        y: clamp_coord(viewport.y),
        zoom: if viewport.zoom.is_finite() {
            viewport.zoom.clamp(0.05, 16.0)
        } else {
            1.0
        },
    };
    if state.viewport == Some(clean) {
        return Applied::noop();
    }
    state.viewport = Some(clean);
    Applied::changed()
}
