//! Route assembly for the WebSocket server.

mod config;
mod debug;
mod health;
mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::server::AppState;

/// Create the router: `/ws` plus the ancillary endpoints, with the web UI
/// served from `web/` at the root.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .route("/api/config", get(config::config_summary))
        .route("/debug/stats", get(debug::debug_stats))
        .fallback_service(ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
