//! HTTP ingest endpoints and the viewer WebSocket
//!
//! Routes:
//! - `POST   /api/hook/:kind` push-hook payload, answered with the new event id
//! - `POST   /api/bridge`     batch of session-log records from a remote bridge
//! - `GET    /api/health`     liveness plus counters
//! - `GET    /api/graph`      current graph snapshot
//! - `DELETE /api/graph`      empty the graph
//! - `GET    /ws`             viewer stream of [`GraphMessage`]s

use crate::auth::AuthPolicy;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use neuralviz_core::bridge::{BridgeBatch, BridgeResponse, BRIDGE_PATH};
use neuralviz_core::broadcast::replay;
use neuralviz_core::config::{LayoutConfig, ServerConfig};
use neuralviz_core::ingest::lock_graph;
use neuralviz_core::{
    Broadcaster, ChannelBroadcaster, ForceLayout, GraphMessage, IngestCoordinator, LayoutParams,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub type Coordinator = IngestCoordinator<ChannelBroadcaster>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub auth: AuthPolicy,
    pub ping_interval: Duration,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, config: &ServerConfig) -> Self {
        Self {
            coordinator,
            auth: AuthPolicy::from_config(config),
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
        }
    }
}

pub fn router(state: AppState, static_dir: Option<&std::path::Path>) -> Router {
    let api = Router::new()
        .route("/api/hook/:kind", post(hook))
        .route(BRIDGE_PATH, post(bridge))
        .route("/api/health", get(health))
        .route("/api/graph", get(graph_snapshot).delete(clear_graph))
        .route("/ws", get(viewer_socket))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    config: &ServerConfig,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    let addr = listener.local_addr().context("listener has no address")?;
    tracing::info!(%addr, mode = %config.deploy_mode, "neuralviz listening");
    println!("neuralviz listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}

// ============================================
// Ingest
// ============================================

/// Decode a request body; an empty body is an empty object
fn parse_body(body: &[u8]) -> std::result::Result<Value, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn hook(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.auth.check(&headers) {
        tracing::warn!(hook = %kind, "Rejected hook request");
        return e.into_response();
    }
    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    match state.coordinator.handle_push_event(&kind, &payload) {
        Ok(event) => Json(json!({ "ok": true, "eventId": event.id })).into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn bridge(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.auth.check(&headers) {
        tracing::warn!("Rejected bridge request");
        return e.into_response();
    }
    let batch = match parse_body(&body).and_then(|v| {
        BridgeBatch::from_json(&v).map_err(|e| bad_request(e.to_string()))
    }) {
        Ok(batch) => batch,
        Err(response) => return response,
    };

    let processed = state.coordinator.handle_bridge_batch(&batch);
    Json(BridgeResponse {
        ok: true,
        processed,
    })
    .into_response()
}

// ============================================
// Graph
// ============================================

async fn health(State(state): State<AppState>) -> Json<Value> {
    let coordinator = &state.coordinator;
    let (nodes, edges) = {
        let graph = lock_graph(coordinator.graph());
        (graph.node_count(), graph.edge_count())
    };
    Json(json!({
        "status": "ok",
        "clients": coordinator.broadcaster().subscriber_count(),
        "sessions": coordinator.session_count(),
        "nodes": nodes,
        "edges": edges,
        "stats": coordinator.stats(),
    }))
}

async fn graph_snapshot(State(state): State<AppState>) -> Response {
    Json(state.coordinator.snapshot()).into_response()
}

async fn clear_graph(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = state.auth.check(&headers) {
        return e.into_response();
    }
    state.coordinator.clear();
    Json(json!({ "ok": true })).into_response()
}

// ============================================
// Viewers
// ============================================

async fn viewer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

/// Subscribe and build the catch-up messages under one graph lock, so every
/// node is delivered exactly once: either in the replay or on the channel.
fn subscribe_with_replay(coordinator: &Coordinator) -> (Receiver<GraphMessage>, Vec<GraphMessage>) {
    let graph = lock_graph(coordinator.graph());
    let rx = coordinator.broadcaster().subscribe();
    let mut messages = replay(&graph);
    if !graph.is_empty() {
        messages.push(GraphMessage::positions(&graph));
    }
    (rx, messages)
}

/// Fresh receiver plus a clear-and-replay for a viewer that lagged.
///
/// The old receiver still queues messages already covered by the replay,
/// so the caller must swap it out for the one returned here.
fn resync(coordinator: &Coordinator) -> (Receiver<GraphMessage>, Vec<GraphMessage>) {
    let (rx, replayed) = subscribe_with_replay(coordinator);
    let mut messages = Vec::with_capacity(replayed.len() + 1);
    messages.push(GraphMessage::GraphCleared {});
    messages.extend(replayed);
    (rx, messages)
}

async fn send_all(
    sender: &mut SplitSink<WebSocket, Message>,
    messages: Vec<GraphMessage>,
) -> std::result::Result<(), axum::Error> {
    for message in messages {
        send(sender, &message).await?;
    }
    Ok(())
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &GraphMessage,
) -> std::result::Result<(), axum::Error> {
    match message.to_json() {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, kind = message.kind(), "Failed to encode viewer message");
            Ok(())
        }
    }
}

async fn handle_viewer(socket: WebSocket, state: AppState) {
    let coordinator = state.coordinator.clone();
    let (mut sender, mut receiver) = socket.split();
    let (mut rx, initial) = subscribe_with_replay(&coordinator);

    tracing::info!(
        clients = coordinator.broadcaster().subscriber_count(),
        replayed = initial.len(),
        "Viewer connected"
    );
    if send_all(&mut sender, initial).await.is_err() {
        return;
    }

    let mut ping = tokio::time::interval(state.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.tick().await;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(message) => {
                    if send(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // The viewer missed messages; rebuild its picture from scratch
                    tracing::warn!(skipped, "Viewer lagged, resending graph");
                    let (fresh, messages) = resync(&coordinator);
                    rx = fresh;
                    if send_all(&mut sender, messages).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(rx);
    tracing::info!(
        clients = coordinator.broadcaster().subscriber_count(),
        "Viewer disconnected"
    );
}

// ============================================
// Layout loop
// ============================================

/// Advance the simulation every `tick_ms` and stream positions to viewers.
pub async fn run_layout(coordinator: Arc<Coordinator>, config: LayoutConfig) {
    let mut layout = ForceLayout::new(LayoutParams::from(&config));
    let broadcast_every = config.broadcast_every.max(1);
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(tick_ms = config.tick_ms, broadcast_every, "Layout loop started");

    loop {
        interval.tick().await;

        let frame = {
            let mut graph = lock_graph(coordinator.graph());
            if graph.is_empty() {
                continue;
            }
            layout.tick(&mut graph);
            let due = layout.frame() % broadcast_every == 0;
            let watched = coordinator.broadcaster().subscriber_count() > 0;
            (due && watched).then(|| GraphMessage::positions(&graph))
        };

        if let Some(frame) = frame {
            coordinator.broadcaster().broadcast(frame);
        }
    }
}
