use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::http::error_response;

#[derive(Deserialize)]
pub struct ContextQuery {
    name: Option<String>,
}

/// GET /personalization/context?name= — profile read (created when absent).
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> impl IntoResponse {
    let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing_name").into_response();
    };
    match state.profiles.get_or_create(name) {
        Ok(profile) => Json(json!({ "profile": profile })).into_response(),
        Err(e) => {
            warn!(error = %e, "profile read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct AppendContextBody {
    name: String,
    line: String,
}

/// POST /personalization/context — append one context line.
pub async fn append_context(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AppendContextBody>,
) -> impl IntoResponse {
    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing_name").into_response();
    }
    match state.profiles.append(&body.name, &body.line) {
        Ok(profile) => Json(json!({ "profile": profile })).into_response(),
        Err(senseboard_profiles::ProfileError::InvalidInput(msg)) => {
            error_response(StatusCode::BAD_REQUEST, msg).into_response()
        }
        Err(e) => {
            warn!(error = %e, "profile append failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
