//! `senseboard-board` — the canvas data model and its pure reducer.
//!
//! # Overview
//!
//! A board is a keyed set of drawable elements plus a display order and a
//! monotonically increasing revision. All mutation flows through
//! [`reducer::apply`], which sanitizes its input, refuses invalid work
//! without touching the revision, and never fails. [`clamp::clamp_to_canvas`]
//! is the auxiliary pass that pulls AI output back into the visible lane.
//!
//! This crate is deliberately passive: no clocks, no I/O, no async. Callers
//! pass the wall-clock timestamp in, which keeps every function replayable
//! in tests.

pub mod clamp;
pub mod element;
pub mod ops;
pub mod reducer;
pub mod state;

pub use element::{
    BoardElement, Bounds, Creator, ElementCommon, ElementStyle, FrameElement, Point,
    PolylineElement, ShapeElement, StickyElement, TextElement,
};
pub use ops::{AlignAxis, BoardOp, DistributeAxis};
pub use reducer::{apply, apply_all, Applied};
pub use state::{BoardState, Viewport};

// Sanitization ceilings — shared by the reducer and the canvas clamp.
pub const MAX_COORD: f64 = 200_000.0;
pub const MAX_ELEMENTS: usize = 1_200;
pub const MAX_TEXT_LEN: usize = 240;
pub const MAX_POINTS: usize = 2_400;
pub const MAX_APPEND_POINTS: usize = 600;
pub const STROKE_WIDTH_RANGE: (f64, f64) = (0.5, 64.0);
pub const ROUGHNESS_RANGE: (f64, f64) = (0.0, 12.0);
pub const FONT_SIZE_RANGE: (f64, f64) = (8.0, 200.0);
