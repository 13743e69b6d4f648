use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use senseboard_core::types::now_ms;

use crate::app::AppState;

/// GET /health — liveness probe. Clients probing port-scan candidates pick
/// the freshest `instanceStartedAt` on a tie.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "now": now_ms(),
        "instanceStartedAt": state.started_at,
        "instanceId": state.instance_id,
        "roomCount": state.store.room_count(),
        "wsClients": state.store.session_count(),
    }))
}
