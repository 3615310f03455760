//! Subscription Fabric: a single WebSocket endpoint letting clients
//! join/leave per-workspace log rooms, bridging the Log Bus to the wire
//! (§4.8).
//!
//! Each `join-app` spawns a small forwarder task that drains that
//! workspace's broadcast receiver into one shared mpsc channel; the
//! connection's main loop just selects between the socket and that channel.
//! This sidesteps juggling a dynamic set of broadcast receivers directly.

use crate::db::apps;
use crate::logbus::LogEvent;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    JoinApp {
        #[serde(rename = "appId")]
        workspace_id: i64,
        token: String,
    },
    LeaveApp {
        #[serde(rename = "appId")]
        workspace_id: i64,
    },
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (forward_tx, mut forward_rx) = mpsc::channel::<(i64, LogEvent)>(256);
    let mut rooms: HashMap<i64, AbortHandle> = HashMap::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::JoinApp { workspace_id, token }) => {
                                if !authorized(&state, workspace_id, &token).await {
                                    continue;
                                }
                                join_room(&state, workspace_id, forward_tx.clone(), &mut rooms, &mut socket).await;
                            }
                            Ok(ClientMessage::LeaveApp { workspace_id }) => {
                                if let Some(handle) = rooms.remove(&workspace_id) {
                                    handle.abort();
                                }
                            }
                            Err(_) => continue,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            Some((workspace_id, event)) = forward_rx.recv() => {
                if send_log(&mut socket, workspace_id, event).await.is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in rooms.drain() {
        handle.abort();
    }
}

async fn join_room(
    state: &AppState,
    workspace_id: i64,
    forward_tx: mpsc::Sender<(i64, LogEvent)>,
    rooms: &mut HashMap<i64, AbortHandle>,
    socket: &mut WebSocket,
) {
    if let Some(handle) = rooms.remove(&workspace_id) {
        handle.abort();
    }

    let (replay, mut receiver) = state.log_bus.subscribe(workspace_id).await;
    for event in replay {
        let _ = send_log(socket, workspace_id, event).await;
    }

    let task = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if forward_tx.send((workspace_id, event)).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });
    rooms.insert(workspace_id, task.abort_handle());
}

async fn send_log(socket: &mut WebSocket, workspace_id: i64, event: LogEvent) -> Result<(), axum::Error> {
    let payload = serde_json::json!({
        "type": "terminal:log",
        "appId": workspace_id,
        "message": event.message,
        "isError": event.is_error,
        "timestamp": event.timestamp,
    });
    socket.send(Message::Text(payload.to_string())).await
}

/// Ownership check on every `join-app` — the bearer token must verify and
/// name the workspace's owner (§4.8 implicitly inherits §8's isolation rule).
async fn authorized(state: &AppState, workspace_id: i64, token: &str) -> bool {
    let Ok(claims) = crate::auth::verify_token(token, &state.config.jwt_secret) else {
        return false;
    };
    let Ok(owner_id) = claims.sub.parse::<i64>() else {
        return false;
    };
    let Ok(conn) = state.db.get() else {
        return false;
    };
    apps::find_owned(&conn, workspace_id, owner_id).is_ok()
}
