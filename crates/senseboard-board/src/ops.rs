use serde::{Deserialize, Serialize};

use crate::element::{BoardElement, ElementStyle, Point};
use crate::state::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignAxis {
    Left,
    CenterX,
    Right,
    Top,
    CenterY,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributeAxis {
    Horizontal,
    Vertical,
}

/// Closed union over every board mutation the reducer accepts. The wire
/// discriminator is `op`; each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardOp {
    UpsertElement {
        element: BoardElement,
    },
    DeleteElement {
        id: String,
    },
    /// Only valid for `stroke` elements; the new points are concatenated and
    /// the polyline tail is truncated at the global cap.
    AppendStrokePoints {
        id: String,
        points: Vec<Point>,
    },
    OffsetElement {
        id: String,
        dx: f64,
        dy: f64,
    },
    /// Absent fields keep their current value. Ignored for polylines.
    SetElementGeometry {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    SetElementStyle {
        id: String,
        style: ElementStyle,
    },
    SetElementText {
        id: String,
        text: String,
    },
    DuplicateElement {
        id: String,
        new_id: String,
        dx: f64,
        dy: f64,
    },
    SetElementZIndex {
        id: String,
        z: i32,
    },
    AlignElements {
        ids: Vec<String>,
        axis: AlignAxis,
    },
    DistributeElements {
        ids: Vec<String>,
        axis: DistributeAxis,
        #[serde(skip_serializing_if = "Option::is_none")]
        gap: Option<f64>,
    },
    ClearBoard,
    SetViewport {
        viewport: Viewport,
    },
    Batch {
        ops: Vec<BoardOp>,
    },
}
