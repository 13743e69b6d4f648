//! `senseboard-protocol` — the websocket wire contract between the server
//! and the whiteboard clients.
//!
//! Every frame is `{ "type": "<tag>", "payload": {...} }`. Client and server
//! frames are closed tagged unions; anything that fails to parse is answered
//! with a `room:error` frame and dropped, never crashing the session.

pub mod frames;
pub mod handshake;

pub use frames::{ClientFrame, ServerFrame};
pub use handshake::{ClientAckPayload, ServerAckPayload};
