//! WebSocket handler — pushes engine events to connected clients.
//!
//! Protocol:
//! ← Server sends: {"type":"connected","version":"..."}
//! ← Server sends: {"type":"message-sent", ...}
//! ← Server sends: {"type":"message-status-update", ...}
//! ← Server sends: {"type":"import-progress"|"delete-progress"|"store-refreshed", ...}
//! → Client sends: {"type":"ping"} → {"type":"pong","timestamp":...}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use std::sync::Arc;

use crate::server::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("WebSocket client connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "message": "BlastClaw Gateway — WebSocket connected",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if send_json(&mut socket, &welcome).await.is_err() {
        return;
    }

    let mut events = state.engine.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = serde_json::to_value(&event)
                            .unwrap_or_else(|e| serde_json::json!({"type": "error", "message": e.to_string()}));
                        if send_json(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WS client lagged, skipped {n} event(s)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let msg_type = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|j| j["type"].as_str().map(String::from))
                            .unwrap_or_default();
                        if msg_type == "ping" {
                            let pong = serde_json::json!({
                                "type": "pong",
                                "timestamp": chrono::Utc::now().timestamp_millis(),
                            });
                            let _ = send_json(&mut socket, &pong).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), ()> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| {
            tracing::error!("WS send failed: {e}");
        })
}
