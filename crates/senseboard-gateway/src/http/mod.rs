pub mod health;
pub mod personalization;
pub mod preflight;
pub mod rooms;
pub mod transcribe;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// Uniform `{error}` body for 4xx/5xx responses.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}
