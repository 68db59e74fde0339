//! WebSocket server for the session protocol.
//!
//! `GET /ws` upgrades to the session socket (token in `?token=` or the
//! `Sec-WebSocket-Protocol` header); `GET /health` reports broker status.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};

use super::manager::SessionManager;
use super::protocol::ServerEvent;
use crate::tool_host::ToolHost;

/// Interval between server pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Inbound frame buffer per connection.
const INBOUND_QUEUE: usize = 64;

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub tools: Arc<RwLock<ToolHost>>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Subprotocol entries that carry the token are echoed back so browsers
    // accept the upgrade.
    let offered: Vec<String> = headers
        .get_all("sec-websocket-protocol")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let (authorized, echoed) = match params.token.as_deref() {
        Some(token) => (state.manager.authorize(Some(token)).is_ok(), None),
        None => match offered.iter().find(|p| state.manager.authorize(Some(p.as_str())).is_ok()) {
            Some(protocol) => (true, Some(protocol.clone())),
            None => (false, None),
        },
    };

    let ws = match echoed {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_socket(socket, state.manager).await;
        } else {
            reject(socket).await;
        }
    })
}

/// Close an unauthenticated socket with a policy-violation code.
async fn reject(mut socket: WebSocket) {
    tracing::warn!("unauthorized connection rejected");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "Unauthorized".into(),
        })))
        .await;
}

/// Pump one authenticated socket through the session driver.
async fn handle_socket(socket: WebSocket, manager: Arc<SessionManager>) {
    let session = manager.open_session();
    let session_id = session.id();
    tracing::info!(session = session_id, "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<String>(INBOUND_QUEUE);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Writer task: forward events to the socket + periodic ping
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                event = out_rx.recv() => {
                    let Some(event) = event else { break };
                    let json = match event.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize server event");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                        break;
                    }
                    tracing::trace!(session = session_id, "sent ping");
                }
            }
        }

        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "Session closed".into(),
            })))
            .await;
    });

    // Reader task: forward text frames to the driver
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if in_tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(session = session_id, "ignoring binary frame");
                }
                Message::Close(_) => break,
                // axum answers pings automatically
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    let end = manager.run(session, in_rx, out_tx).await;
    reader.abort();
    // The driver dropped its sender; the writer drains, closes, and exits.
    let _ = writer.await;
    tracing::info!(session = session_id, reason = ?end, "WebSocket client disconnected");
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.tools.read().await;
    let tool_count = tools.get_all_tools().await.len();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": tools.provider_ids(),
        "tools": tool_count,
        "session_active": state.manager.active_session().is_some(),
    }))
}
