use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use senseboard_core::config::MIN_AUDIO_BYTES;

use crate::app::AppState;
use crate::http::error_response;

/// POST /rooms/{id}/transcribe — multipart `speaker` + `audio`.
///
/// Tiny blobs are rejected before the provider is ever called; accepted text
/// lands in the transcript, arms the debounced patch trigger, and is
/// broadcast with the snapshot.
pub async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut speaker: Option<String> = None;
    let mut audio: Option<(Vec<u8>, String)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("speaker") => {
                speaker = field.text().await.ok().map(|s| s.trim().to_string());
            }
            Some("audio") => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if let Ok(bytes) = field.bytes().await {
                    audio = Some((bytes.to_vec(), mime));
                }
            }
            _ => {}
        }
    }

    let Some((audio, mime)) = audio else {
        return error_response(StatusCode::BAD_REQUEST, "missing audio field").into_response();
    };
    if audio.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty audio").into_response();
    }
    if audio.len() < MIN_AUDIO_BYTES {
        return Json(json!({
            "ok": true,
            "accepted": false,
            "reason": "audio_too_small",
        }))
        .into_response();
    }

    let room_id = state.store.get_or_create(&id);
    let speaker = speaker.filter(|s| !s.is_empty());

    maybe_capture(&state, speaker.as_deref(), &audio).await;

    let transcription = match state.transcriber.transcribe(audio, &mime).await {
        Ok(t) => t,
        Err(e) => {
            warn!(room = %room_id, error = %e, "transcription failed");
            return error_response(StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let text = transcription.text.trim().to_string();
    if text.is_empty() {
        return Json(json!({
            "ok": true,
            "text": "",
            "accepted": false,
            "reason": "empty_transcript",
        }))
        .into_response();
    }

    let outcome = state
        .store
        .add_transcript(&room_id, speaker.as_deref(), &text);
    match outcome {
        Some(outcome) if outcome.transcript_accepted => {
            state.scheduler.note_transcript(&room_id);
            Json(json!({ "ok": true, "text": text, "accepted": true })).into_response()
        }
        Some(outcome) => Json(json!({
            "ok": true,
            "text": text,
            "accepted": false,
            "reason": outcome.reject.unwrap_or("low_signal"),
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "room not found").into_response(),
    }
}

/// Persist the raw chunk for debugging when capture is enabled. Failures are
/// logged and never fail the request.
async fn maybe_capture(state: &AppState, speaker: Option<&str>, audio: &[u8]) {
    let capture = &state.config.capture.transcription_chunks;
    if !capture.enabled {
        return;
    }
    let dir = capture.directory.clone();
    let file = format!(
        "{}/{}-{}.bin",
        dir,
        senseboard_core::types::now_ms(),
        speaker.unwrap_or("unknown")
    );
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        debug!(error = %e, "capture dir create failed");
        return;
    }
    if let Err(e) = tokio::fs::write(&file, audio).await {
        debug!(error = %e, file, "capture write failed");
    } else {
        debug!(file, bytes = audio.len(), "captured audio chunk");
    }
}
