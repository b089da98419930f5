// ABOUTME: HTTP server for switchboard, exposing each agent network under /api/v1/{agent}.
// ABOUTME: Uses Axum with shared agent services and a locked map of polling-style sessions.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

pub use app_state::{AppState, SharedState, spawn_session_pruner};
pub use config::{ConfigError, ServerConfig};
pub use routes::create_router;
