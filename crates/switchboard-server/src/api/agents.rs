// ABOUTME: JSON handlers for one agent network: function, connectivity, chat, logs, reset.
// ABOUTME: Chat starts a turn in the background; logs polls it by session id.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use switchboard_agent::{AgentSession, ChatRequest, SessionRequest};

use crate::api::{error_response, unknown_agent};
use crate::app_state::SharedState;

/// GET /api/v1/networks - Names of the served networks.
pub async fn list_networks(State(state): State<SharedState>) -> Json<Vec<String>> {
    Json(state.services.network_names())
}

/// GET /api/v1/{agent}/function - The front man's function signature.
pub async fn function(State(state): State<SharedState>, Path(agent): Path<String>) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.function().await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/v1/{agent}/connectivity - Which tools each agent can reach.
pub async fn connectivity(State(state): State<SharedState>, Path(agent): Path<String>) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.connectivity().await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /api/v1/{agent}/chat - Start a turn; returns the session id to poll.
pub async fn chat(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.chat(request).await {
        Ok(started) => (StatusCode::ACCEPTED, Json(started)).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /api/v1/{agent}/logs - Status, logs and answer of a polling session.
pub async fn logs(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
    Json(request): Json<SessionRequest>,
) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.logs(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /api/v1/{agent}/reset - Tear down a polling session.
pub async fn reset(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
    Json(request): Json<SessionRequest>,
) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.reset(request).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}
