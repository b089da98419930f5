// ABOUTME: Route definitions for the switchboard HTTP API.
// ABOUTME: Assembles all agent-network routes into a single Axum Router with tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/networks", get(api::agents::list_networks))
        .route("/api/v1/{agent}/function", get(api::agents::function))
        .route("/api/v1/{agent}/connectivity", get(api::agents::connectivity))
        .route("/api/v1/{agent}/chat", post(api::agents::chat))
        .route("/api/v1/{agent}/logs", post(api::agents::logs))
        .route("/api/v1/{agent}/reset", post(api::agents::reset))
        .route("/api/v1/{agent}/streaming_chat", post(api::stream::streaming_chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler. Returns 200 OK with a simple JSON body.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
