//! Sotto Relay Server
//!
//! WebSocket relay for two-party end-to-end encrypted chat. The relay
//! brokers sessions, forwards key material and envelopes, and never sees
//! plaintext or keys.

mod config;
mod relay;
mod state;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, ConnectionContext};

/// Build the router: one WebSocket route plus health and stats.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(relay::ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Stats endpoint
async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "sessions": state.registry.len(),
        "connections": state.connections.len(),
    }))
}
