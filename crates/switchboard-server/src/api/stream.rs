// ABOUTME: SSE handler for streaming one chat turn of an agent network.
// ABOUTME: Each journaled message becomes one `data:` event; the stream closes after the turn.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{Stream, StreamExt};
use switchboard_agent::{AgentSession, ChatRequest, ChatResponse, SessionError};

use crate::api::{error_response, unknown_agent};
use crate::app_state::SharedState;

/// Convert chat responses into SSE events. A failed item ends the stream
/// with an `error` event.
fn sse_events<S>(responses: S) -> impl Stream<Item = Result<SseEvent, axum::Error>>
where
    S: Stream<Item = Result<ChatResponse, SessionError>> + Send + 'static,
{
    responses.map(|item| match item {
        Ok(response) => SseEvent::default().json_data(&response),
        Err(err) => {
            tracing::warn!(error = %err, "streaming turn failed");
            Ok(SseEvent::default().event("error").data(err.to_string()))
        }
    })
}

/// POST /api/v1/{agent}/streaming_chat - Run one turn, streaming every message.
pub async fn streaming_chat(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(session) = state.session(&agent) else {
        return unknown_agent(&agent);
    };
    match session.streaming_chat(request).await {
        Ok(responses) => Sse::new(sse_events(responses))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use switchboard_core::{ChatMessage, ChatMessageType};

    #[tokio::test]
    async fn every_response_becomes_an_event() {
        let responses = stream::iter(vec![
            Ok(ChatResponse {
                response: ChatMessage::new(ChatMessageType::Ai, "hi", Vec::new()),
            }),
            Err(SessionError::Agent("boom".into())),
        ]);
        let events: Vec<_> = sse_events(responses).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(Result::is_ok));
    }
}
