//! Room websocket lifecycle.
//!
//! State machine per connection:
//!
//! AwaitingAck ──client:ack──► Attached ──(runs until close)──► Detached
//!
//! Before the ack, every non-ack frame is answered with `room:error` and
//! dropped; the connection closes if the ack never arrives inside the
//! handshake window. After the ack the session is attached to the room, the
//! first snapshot goes out, and client frames route through the store.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use senseboard_core::config::{HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES};
use senseboard_core::types::{MemberId, RoomId, SessionId};
use senseboard_protocol::frames::{ClientFrame, ServerFrame};
use senseboard_protocol::handshake::ServerAckPayload;

use crate::app::AppState;
use crate::http::error_response;

/// Outgoing frames buffered per session before the socket write loop.
const SESSION_BUFFER: usize = 64;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    room_id: Option<String>,
    name: Option<String>,
}

#[derive(Clone)]
enum ConnState {
    AwaitingAck,
    Attached { member_id: MemberId },
}

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let Some(room_id) = query
        .room_id
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "roomId query parameter required")
            .into_response();
    };
    let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "name query parameter required")
            .into_response();
    };

    let room_id = state.store.get_or_create(room_id);
    let name = name.to_string();
    ws.on_upgrade(move |socket| handle_connection(socket, state, room_id, name))
        .into_response()
}

/// Per-connection task — lives for the entire session lifetime.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, room_id: RoomId, name: String) {
    let session_id = SessionId::new();
    info!(session = %session_id, room = %room_id, member = %name, "new room socket");

    let (mut tx, mut rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(SESSION_BUFFER);

    let mut conn_state = ConnState::AwaitingAck;

    // close if the client never acks
    let handshake_deadline = tokio::time::Instant::now()
        + std::time::Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let mut handshake_timer = Box::pin(tokio::time::sleep_until(handshake_deadline));

    loop {
        tokio::select! {
            // client sent us something
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > MAX_PAYLOAD_BYTES {
                            warn!(session = %session_id, size = text_ref.len(), "payload too large, dropping");
                            let _ = send_frame(&mut tx, &ServerFrame::error(
                                "Message too large.",
                            )).await;
                            continue;
                        }
                        match process_message(
                            text_ref, conn_state.clone(), &mut tx, &state, &room_id, &session_id,
                            &name, &out_tx,
                        ).await {
                            Some(next) => conn_state = next,
                            None => break,
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session = %session_id, error = %e, "socket read error");
                        break;
                    }
                    _ => {}
                }
            }

            // broadcast snapshot (or ack) → forward to this client
            frame = out_rx.recv() => {
                match frame {
                    Some(json) => {
                        if tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // handshake timeout — drop never-acked connections
            _ = &mut handshake_timer => {
                if matches!(conn_state, ConnState::AwaitingAck) {
                    warn!(session = %session_id, "handshake timeout, closing connection");
                    break;
                }
            }
        }
    }

    if matches!(conn_state, ConnState::Attached { .. }) {
        state.store.detach(&room_id, &session_id);
    }
    info!(session = %session_id, room = %room_id, "room socket closed");
}

type WsSink = futures_util::stream::SplitSink<WebSocket, Message>;

/// Handle one inbound text frame. Returns the next connection state, or
/// `None` to close the connection.
#[allow(clippy::too_many_arguments)]
async fn process_message(
    text: &str,
    conn_state: ConnState,
    tx: &mut WsSink,
    state: &Arc<AppState>,
    room_id: &RoomId,
    session_id: &SessionId,
    name: &str,
    out_tx: &mpsc::Sender<String>,
) -> Option<ConnState> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(session = %session_id, error = %e, "malformed frame");
            let _ = send_frame(tx, &ServerFrame::error("Invalid websocket message payload."))
                .await;
            return Some(conn_state);
        }
    };

    match conn_state {
        ConnState::AwaitingAck => match frame {
            ClientFrame::ClientAck(ack) => {
                if !ack.protocol_matches() {
                    let _ = send_frame(
                        tx,
                        &ServerFrame::error(format!(
                            "Unsupported protocol '{}'.",
                            ack.protocol
                        )),
                    )
                    .await;
                    return Some(ConnState::AwaitingAck);
                }

                let member_id = state.store.attach(
                    room_id,
                    session_id.clone(),
                    name,
                    out_tx.clone(),
                )?;
                let ack_frame = ServerFrame::ServerAck(ServerAckPayload::new(
                    room_id.as_str(),
                    member_id.as_str(),
                ));
                if send_frame(tx, &ack_frame).await.is_err() {
                    state.store.detach(room_id, session_id);
                    return None;
                }
                debug!(session = %session_id, member = %member_id, "handshake complete");
                Some(ConnState::Attached { member_id })
            }
            _ => {
                let _ = send_frame(
                    tx,
                    &ServerFrame::error(
                        "Handshake required before sending messages.",
                    ),
                )
                .await;
                Some(ConnState::AwaitingAck)
            }
        },

        ConnState::Attached { member_id } => {
            if matches!(frame, ClientFrame::ClientAck(_)) {
                // duplicate ack after attach — harmless, ignore
                return Some(ConnState::Attached { member_id });
            }
            match state.store.apply_message(room_id, name, frame) {
                Some(outcome) => {
                    if outcome.transcript_accepted {
                        state.scheduler.note_transcript(room_id);
                    }
                    if let Some(reason) = outcome.reject {
                        debug!(session = %session_id, reason, "message dropped");
                    }
                }
                None => {
                    let _ = send_frame(tx, &ServerFrame::error("Room no longer exists."))
                        .await;
                }
            }
            Some(ConnState::Attached { member_id })
        }
    }
}

/// Serialize and send a frame over the WS sink.
async fn send_frame(tx: &mut WsSink, frame: &ServerFrame) -> Result<(), axum::Error> {
    tx.send(Message::Text(frame.to_json().into()))
        .await
        .map_err(axum::Error::new)
}
