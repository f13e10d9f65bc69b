//! Implements the core web server and WebSocket logic using axum.

use crate::model::DiagnosticSnapshot;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use log::{error, info, trace, warn};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Shared server state: the broadcast channel feeding WebSocket clients and
/// the most recent snapshot for plain HTTP polling.
#[derive(Clone)]
pub struct MonitorState {
    snapshot_tx: broadcast::Sender<DiagnosticSnapshot>,
    latest: Arc<RwLock<Option<DiagnosticSnapshot>>>,
}

impl MonitorState {
    /// `capacity` bounds how far a slow WebSocket client may lag before it
    /// starts skipping snapshots.
    pub fn new(capacity: usize) -> Self {
        let (snapshot_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            snapshot_tx,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Stores `snapshot` as the latest and forwards it to connected clients.
    pub fn publish(&self, snapshot: DiagnosticSnapshot) {
        match self.latest.write() {
            Ok(mut latest) => *latest = Some(snapshot.clone()),
            Err(_) => warn!("Latest snapshot lock poisoned; keeping the stream only."),
        }
        // No subscribers is not an error.
        let _ = self.snapshot_tx.send(snapshot);
    }

    pub fn latest(&self) -> Option<DiagnosticSnapshot> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticSnapshot> {
        self.snapshot_tx.subscribe()
    }
}

/// Builds the monitor routes.
pub fn router(state: MonitorState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Binds to `addr` and serves the monitor until the server fails.
pub async fn start_web_server(addr: SocketAddr, state: MonitorState) -> std::io::Result<()> {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind web server to {}: {}", addr, e);
            return Err(e);
        }
    };
    info!("Web monitor listening on http://{}", addr);

    axum::serve(listener, router(state)).await.inspect_err(|e| {
        error!("Web server encountered an error: {}", e);
    })
}

/// Serves the embedded monitor page.
async fn root_handler() -> impl IntoResponse {
    Html(include_str!("web/monitor.html"))
}

/// Returns the latest snapshot, or 204 before the first one arrives.
async fn snapshot_handler(State(state): State<MonitorState>) -> Response {
    match state.latest() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<MonitorState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(snapshot: &DiagnosticSnapshot) -> Option<Message> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to serialize snapshot to JSON: {}", e);
            None
        }
    }
}

/// Streams snapshots to one WebSocket client until it goes away.
async fn handle_socket(mut socket: WebSocket, state: MonitorState) {
    info!("New WebSocket client connected.");
    let mut snapshot_rx = state.subscribe();

    // New clients get the current picture right away.
    if let Some(message) = state.latest().as_ref().and_then(encode) {
        if socket.send(message).await.is_err() {
            info!("WebSocket client disconnected (send error).");
            return;
        }
    }

    loop {
        tokio::select! {
            received = snapshot_rx.recv() => {
                match received {
                    Ok(snapshot) => {
                        trace!("Forwarding snapshot t={} ms to WebSocket client.", snapshot.time_ms);
                        let Some(message) = encode(&snapshot) else { continue };
                        if socket.send(message).await.is_err() {
                            info!("WebSocket client disconnected (send error).");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagging, skipped {} snapshots.", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Snapshot stream closed.");
                        break;
                    }
                }
            }
            Some(Ok(msg)) = socket.recv() => {
                if let Message::Close(_) = msg {
                    info!("WebSocket client disconnected (received close message).");
                    break;
                }
            }
            else => {
                info!("WebSocket client disconnected (channel closed).");
                break;
            }
        }
    }
}
