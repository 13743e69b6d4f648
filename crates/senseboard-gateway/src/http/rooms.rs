use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use senseboard_core::types::name_key;
use senseboard_scheduler::{PatchReason, PatchRequest};

use crate::app::AppState;
use crate::http::error_response;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomBody {
    room_id: Option<String>,
}

/// POST /rooms — create (or idempotently return) a room.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateRoomBody>>,
) -> impl IntoResponse {
    let requested = body
        .and_then(|Json(b)| b.room_id)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_room_code);
    let id = state.store.get_or_create(&requested);
    let room = state.store.snapshot(&id).unwrap_or(serde_json::Value::Null);
    Json(json!({ "roomId": id.as_str(), "room": room }))
}

/// GET /rooms/{id} — fetch the room, creating it when missing (lookup with
/// fallback semantics).
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = state.store.get_or_create(&id);
    let room = state.store.snapshot(&id).unwrap_or(serde_json::Value::Null);
    Json(json!({ "room": room }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AiPatchBody {
    reason: Option<String>,
    #[serde(default)]
    regenerate: bool,
    window_seconds: Option<u64>,
}

fn parse_reason(reason: Option<&str>) -> PatchReason {
    match reason {
        Some("tick") => PatchReason::Tick,
        _ => PatchReason::Manual,
    }
}

/// POST /rooms/{id}/ai-patch — enqueue on main and on each active member's
/// personalized queue; returns the main job's result.
pub async fn ai_patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<AiPatchBody>>,
) -> impl IntoResponse {
    let id = state.store.get_or_create(&id);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let request = PatchRequest {
        room_id: id.clone(),
        reason: parse_reason(body.reason.as_deref()),
        regenerate: body.regenerate,
        window_seconds: body.window_seconds,
        transcript_chunk_count: None,
    };

    let members = state
        .store
        .with_room(&id, |room| room.member_name_keys())
        .unwrap_or_default();
    for member in members {
        state
            .scheduler
            .submit_personal_detached(request.clone(), &member);
    }

    let outcome = state.scheduler.submit_main(request).await;
    Json(serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null))
}

#[derive(Deserialize)]
pub struct PersonalBoardQuery {
    name: Option<String>,
}

/// GET /rooms/{id}/personal-board?name= — one member's personal canvas.
pub async fn personal_board(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PersonalBoardQuery>,
) -> impl IntoResponse {
    let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing_name").into_response();
    };
    let id = state.store.get_or_create(&id);
    let key = name_key(name);
    let payload = state
        .store
        .with_room(&id, |room| {
            room.personal
                .get(&key)
                .map(|p| (serde_json::to_value(&p.board).ok(), p.last_ai_patch_at))
        })
        .flatten();

    match payload {
        Some((board, updated_at)) => Json(json!({
            "board": board,
            "updatedAt": updated_at,
        }))
        .into_response(),
        None => Json(json!({
            "board": senseboard_board::BoardState::new(),
            "updatedAt": 0,
        }))
        .into_response(),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersonalAiPatchBody {
    name: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    regenerate: bool,
    window_seconds: Option<u64>,
}

/// POST /rooms/{id}/personal-board/ai-patch — fire-and-forget enqueue.
pub async fn personal_ai_patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PersonalBoardQuery>,
    body: Option<Json<PersonalAiPatchBody>>,
) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let name = body
        .name
        .as_deref()
        .or(query.name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let Some(name) = name else {
        return error_response(StatusCode::BAD_REQUEST, "missing_name").into_response();
    };

    let id = state.store.get_or_create(&id);
    let request = PatchRequest {
        room_id: id,
        reason: parse_reason(body.reason.as_deref()),
        regenerate: body.regenerate,
        window_seconds: body.window_seconds,
        transcript_chunk_count: None,
    };
    state
        .scheduler
        .submit_personal_detached(request, &name_key(name));

    Json(json!({ "applied": false, "reason": "queued" })).into_response()
}

/// Six char room code from a fresh UUID — uppercase alphanumerics only.
fn generate_room_code() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(6)
        .collect::<String>()
        .to_uppercase()
}
