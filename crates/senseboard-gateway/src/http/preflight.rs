use axum::http::StatusCode;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::app::AppState;

/// GET /ai/preflight — provider self-check; 200 when the configured
/// generator is usable, 503 otherwise.
pub async fn preflight_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.preflight().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "provider": state.engine.provider_name(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "provider": state.engine.provider_name(),
                "error": e.to_string(),
            })),
        ),
    }
}
