//! Observer WebSocket channels.
//!
//! Two endpoints: `/ws/admin/{session_id}` streams the state view once a
//! second; `/ws/player/{session_id}` additionally handshakes a join,
//! forwards broadcast payloads and routes answer frames to the controller.
//! Rejected player actions are ignored silently, matching what clients
//! expect from the protocol.

use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::server::AppState;

/// Messages a player client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PlayerInbound {
    Join {
        name: Option<String>,
        player_id: Option<String>,
    },
    Answer {
        answer: Option<String>,
    },
}

/// Create the WebSocket router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/{session_id}", get(admin_socket))
        .route("/player/{session_id}", get(player_socket))
}

async fn admin_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_admin_socket(socket, state, session_id))
}

/// Push the state view every second until the client goes away.
async fn handle_admin_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let view = match state.controller.state(&session_id).await {
                    Ok(view) => view,
                    Err(e) => {
                        debug!(%session_id, error = %e, "Admin socket closing, state unavailable");
                        break;
                    }
                };
                let payload = serde_json::json!({ "type": "state", "state": view });
                let Ok(payload) = serde_json::to_string(&payload) else { continue };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

async fn player_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_player_socket(socket, state, session_id))
}

/// Handshake a join, then forward broadcasts, poll state every second and
/// route answer frames to the controller until the client disconnects.
async fn handle_player_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // The first frame must be a join; anything else ends the connection.
    let join = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                break serde_json::from_str::<PlayerInbound>(&text).ok();
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => break None,
        }
    };
    let Some(PlayerInbound::Join { name, player_id }) = join else {
        let _ = sender.close().await;
        return;
    };

    let player = match state
        .controller
        .register_player(
            &session_id,
            name.as_deref().unwrap_or(""),
            player_id.as_deref(),
        )
        .await
    {
        Ok(player) => player,
        Err(e) => {
            warn!(%session_id, error = %e, "Player registration failed");
            let _ = sender.close().await;
            return;
        }
    };
    let player_id = player.id.clone();

    let (sink_id, mut broadcast_rx) = state.controller.attach_sink(&session_id);

    let welcome = serde_json::json!({ "type": "welcome", "player": player });
    let welcome_sent = match serde_json::to_string(&welcome) {
        Ok(payload) => sender.send(Message::Text(payload.into())).await.is_ok(),
        Err(_) => false,
    };

    if welcome_sent {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                payload = broadcast_rx.recv() => {
                    match payload {
                        Some(payload) => {
                            if sender.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = heartbeat.tick() => {
                    let view = match state.controller.state(&session_id).await {
                        Ok(view) => view,
                        Err(e) => {
                            debug!(%session_id, error = %e, "Player socket closing, state unavailable");
                            break;
                        }
                    };
                    let payload = serde_json::json!({ "type": "state", "state": view });
                    let Ok(payload) = serde_json::to_string(&payload) else { continue };
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }

                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(PlayerInbound::Answer { answer }) =
                                serde_json::from_str::<PlayerInbound>(&text)
                            {
                                match state
                                    .controller
                                    .submit_answer(&session_id, &player_id, answer.as_deref())
                                    .await
                                {
                                    Ok(accepted) => {
                                        if !accepted {
                                            debug!(
                                                %session_id,
                                                %player_id,
                                                "Answer rejected silently"
                                            );
                                        }
                                    }
                                    Err(e) => {
                                        warn!(%session_id, %player_id, error = %e, "Answer processing failed");
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(_)) => break,
                    }
                }
            }
        }
    }

    state.controller.detach_sink(&session_id, sink_id);
    if let Err(e) = state
        .controller
        .disconnect_player(&session_id, &player_id)
        .await
    {
        warn!(%session_id, %player_id, error = %e, "Failed to persist disconnect");
    }
}
