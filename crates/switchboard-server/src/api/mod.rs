// ABOUTME: API module containing the HTTP handlers for agent networks.
// ABOUTME: Maps session errors onto status codes shared by every handler.

pub mod agents;
pub mod stream;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use switchboard_agent::SessionError;

/// Render a session error as a JSON error response.
///
/// An unknown network is a 404, which remote callers read as
/// "agent not served here".
pub fn error_response(err: SessionError) -> Response {
    let status = match &err {
        SessionError::Unimplemented(_) => StatusCode::NOT_FOUND,
        SessionError::UnknownSession(_) => StatusCode::BAD_REQUEST,
        SessionError::Agent(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
        SessionError::Protocol(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

pub(crate) fn unknown_agent(agent: &str) -> Response {
    error_response(SessionError::Unimplemented(agent.to_string()))
}
