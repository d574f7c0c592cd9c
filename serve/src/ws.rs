//! WebSocket transport: one MCP frame per message, responses via the shared
//! wire protocol.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use hivemind::mcp::wire::handle_frame;

use crate::app::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            "missing or invalid bearer token",
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    while let Some(incoming) = socket.recv().await {
        let message = match incoming {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("ws read error (client closed?): {}", e);
                break;
            }
        };
        let text = match &message {
            Message::Text(t) => t.clone(),
            Message::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let response = handle_frame(&state.hub.dispatcher, &text).await;
        let encoded = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("ws encode error: {}", e);
                continue;
            }
        };
        if socket.send(Message::Text(encoded)).await.is_err() {
            break;
        }
    }
}
