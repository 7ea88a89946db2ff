//! Inkwire WebSocket Relay Server
//!
//! Relays draw events between clients in the same room and keeps each
//! room's finalized strokes so late joiners can fetch a snapshot.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "room": "room-id", "participant": "u1" }
//! { "type": "draw:start", "x": 10, "y": 20, "color": "#000000", "width": 2, "isEraser": false }
//! { "type": "snapshot:fetch" }
//! ```
//! Draw events are forwarded to the other peers with a `from` field.

mod config;
mod relay;
mod room;

use axum::{
    Json, Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use config::ServerConfig;
use inkwire_core::SnapshotResponse;
use room::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkwire_server=info,inkwire_core=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.addr();
    let state = Arc::new(AppState::new(config));

    let app = router(state);

    info!("Inkwire relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/rooms/{room}/snapshot", get(snapshot))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Inkwire Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// Finalized strokes of a room.
async fn snapshot(Path(room): Path<String>, State(state): State<Arc<AppState>>) -> Json<SnapshotResponse> {
    Json(state.snapshot(&room))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::handle_socket(socket, state))
}
