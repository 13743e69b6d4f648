use serde::{Deserialize, Serialize};

/// Who placed an element on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    Ai,
    System,
}

/// Optional per-element presentation overrides. All fields are independent;
/// [`ElementStyle::merge`] folds a partial update into an existing style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

impl ElementStyle {
    pub fn is_empty(&self) -> bool {
        self.stroke_color.is_none()
            && self.fill_color.is_none()
            && self.stroke_width.is_none()
            && self.roughness.is_none()
            && self.font_size.is_none()
    }

    /// Overlay `patch` onto `self` — present fields win, absent fields keep
    /// the current value.
    pub fn merge(&mut self, patch: &ElementStyle) {
        if let Some(v) = &patch.stroke_color {
            self.stroke_color = Some(v.clone());
        }
        if let Some(v) = &patch.fill_color {
            self.fill_color = Some(v.clone());
        }
        if let Some(v) = patch.stroke_width {
            self.stroke_width = Some(v);
        }
        if let Some(v) = patch.roughness {
            self.roughness = Some(v);
        }
        if let Some(v) = patch.font_size {
            self.font_size = Some(v);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Fields shared by every element variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementCommon {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ElementStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<i32>,
    pub created_at: i64,
    pub created_by: Creator,
}

/// A positioned box with an optional label — rect, ellipse, diamond, triangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Rect with mandatory text body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

/// Rect grouping container with an optional title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Freehand stroke, straight line, or arrow — all carried as a polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineElement {
    #[serde(flatten)]
    pub common: ElementCommon,
    pub points: Vec<Point>,
}

/// Closed union over every drawable primitive. The wire discriminator is
/// `kind`, matching the client's element model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BoardElement {
    Text(TextElement),
    Rect(ShapeElement),
    Ellipse(ShapeElement),
    Diamond(ShapeElement),
    Triangle(ShapeElement),
    Sticky(StickyElement),
    Frame(FrameElement),
    Stroke(PolylineElement),
    Line(PolylineElement),
    Arrow(PolylineElement),
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

impl BoardElement {
    pub fn common(&self) -> &ElementCommon {
        match self {
            BoardElement::Text(e) => &e.common,
            BoardElement::Rect(e)
            | BoardElement::Ellipse(e)
            | BoardElement::Diamond(e)
            | BoardElement::Triangle(e) => &e.common,
            BoardElement::Sticky(e) => &e.common,
            BoardElement::Frame(e) => &e.common,
            BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => &e.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut ElementCommon {
        match self {
            BoardElement::Text(e) => &mut e.common,
            BoardElement::Rect(e)
            | BoardElement::Ellipse(e)
            | BoardElement::Diamond(e)
            | BoardElement::Triangle(e) => &mut e.common,
            BoardElement::Sticky(e) => &mut e.common,
            BoardElement::Frame(e) => &mut e.common,
            BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
                &mut e.common
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BoardElement::Text(_) => "text",
            BoardElement::Rect(_) => "rect",
            BoardElement::Ellipse(_) => "ellipse",
            BoardElement::Diamond(_) => "diamond",
            BoardElement::Triangle(_) => "triangle",
            BoardElement::Sticky(_) => "sticky",
            BoardElement::Frame(_) => "frame",
            BoardElement::Stroke(_) => "stroke",
            BoardElement::Line(_) => "line",
            BoardElement::Arrow(_) => "arrow",
        }
    }

    /// Bounding box. `None` for polylines without points — such elements are
    /// not renderable and are skipped by align/distribute.
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            BoardElement::Text(e) => Some(Bounds {
                x: e.x,
                y: e.y,
                // A text block has no explicit box; approximate from content
                // so alignment has something to anchor on.
                width: (e.text.chars().count() as f64 * 8.0).max(8.0),
                height: 24.0,
            }),
            BoardElement::Rect(e)
            | BoardElement::Ellipse(e)
            | BoardElement::Diamond(e)
            | BoardElement::Triangle(e) => Some(Bounds {
                x: e.x,
                y: e.y,
                width: e.width,
                height: e.height,
            }),
            BoardElement::Sticky(e) => Some(Bounds {
                x: e.x,
                y: e.y,
                width: e.width,
                height: e.height,
            }),
            BoardElement::Frame(e) => Some(Bounds {
                x: e.x,
                y: e.y,
                width: e.width,
                height: e.height,
            }),
            BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
                if e.points.is_empty() {
                    return None;
                }
                let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
                let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
                for p in &e.points {
                    min_x = min_x.min(p.x);
                    min_y = min_y.min(p.y);
                    max_x = max_x.max(p.x);
                    max_y = max_y.max(p.y);
                }
                Some(Bounds {
                    x: min_x,
                    y: min_y,
                    width: max_x - min_x,
                    height: max_y - min_y,
                })
            }
        }
    }

    /// Move the element by (dx, dy) without changing its size.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            BoardElement::Text(e) => {
                e.x += dx;
                e.y += dy;
            }
            BoardElement::Rect(e)
            | BoardElement::Ellipse(e)
            | BoardElement::Diamond(e)
            | BoardElement::Triangle(e) => {
                e.x += dx;
                e.y += dy;
            }
            BoardElement::Sticky(e) => {
                e.x += dx;
                e.y += dy;
            }
            BoardElement::Frame(e) => {
                e.x += dx;
                e.y += dy;
            }
            BoardElement::Stroke(e) | BoardElement::Line(e) | BoardElement::Arrow(e) => {
                for p in &mut e.points {
                    p.x += dx;
                    p.y += dy;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(id: &str) -> ElementCommon {
        ElementCommon {
            id: id.to_string(),
            style: None,
            z: None,
            created_at: 0,
            created_by: Creator::System,
        }
    }

    #[test]
    fn element_kind_tag_round_trips() {
        let el = BoardElement::Sticky(StickyElement {
            common: common("s1"),
            x: 10.0,
            y: 20.0,
            width: 120.0,
            height: 80.0,
            text: "note".to_string(),
        });
        let json = serde_json::to_string(&el).unwrap();
        assert!(json.contains(r#""kind":"sticky""#));
        assert!(json.contains(r#""createdBy":"system""#));
        let back: BoardElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, el);
    }

    #[test]
    fn polyline_bounds_cover_points() {
        let el = BoardElement::Arrow(PolylineElement {
            common: common("a1"),
            points: vec![Point { x: 5.0, y: 40.0 }, Point { x: 25.0, y: 10.0 }],
        });
        let b = el.bounds().unwrap();
        assert_eq!((b.x, b.y), (5.0, 10.0));
        assert_eq!((b.width, b.height), (20.0, 30.0));
    }

    #[test]
    fn empty_polyline_is_not_renderable() {
        let el = BoardElement::Stroke(PolylineElement {
            common: common("p0"),
            points: vec![],
        });
        assert!(el.bounds().is_none());
    }

    #[test]
    fn style_merge_keeps_absent_fields() {
        let mut style = ElementStyle {
            stroke_color: Some("#222".into()),
            stroke_width: Some(2.0),
            ..Default::default()
        };
        style.merge(&ElementStyle {
            stroke_color: Some("#f60".into()),
            ..Default::default()
        });
        assert_eq!(style.stroke_color.as_deref(), Some("#f60"));
        assert_eq!(style.stroke_width, Some(2.0));
    }
}
