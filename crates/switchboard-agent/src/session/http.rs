// ABOUTME: Session onto an agent network served by a remote switchboard server over HTTP.
// ABOUTME: JSON request/response for polling operations; SSE `data:` lines for streaming chat.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::session::{
    AgentSession, ChatRequest, ChatResponse, ChatStarted, ConnectivityResponse, FunctionResponse,
    LogsResponse, SessionError, SessionRequest,
};

pub struct HttpAgentSession {
    client: reqwest::Client,
    base_url: String,
    agent: String,
}

impl HttpAgentSession {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            agent: agent.into(),
        }
    }

    fn url(&self, operation: &str) -> String {
        format!(
            "{}/api/v1/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.agent,
            operation
        )
    }

    async fn checked(&self, response: reqwest::Response) -> Result<reqwest::Response, SessionError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SessionError::Unimplemented(self.agent.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Protocol(format!("{status}: {body}")));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str) -> Result<T, SessionError> {
        let response = self
            .client
            .get(self.url(operation))
            .send()
            .await
            .map_err(transport)?;
        let response = self.checked(response).await?;
        response
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn post<B: Serialize + Sync>(&self, operation: &str, body: &B) -> Result<reqwest::Response, SessionError> {
        let response = self
            .client
            .post(self.url(operation))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        self.checked(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<T, SessionError> {
        self.post(operation, body)
            .await?
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

fn transport(err: reqwest::Error) -> SessionError {
    SessionError::Transport(err.to_string())
}

#[async_trait]
impl AgentSession for HttpAgentSession {
    async fn function(&self) -> Result<FunctionResponse, SessionError> {
        self.get_json("function").await
    }

    async fn connectivity(&self) -> Result<ConnectivityResponse, SessionError> {
        self.get_json("connectivity").await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatStarted, SessionError> {
        self.post_json("chat", &request).await
    }

    async fn logs(&self, request: SessionRequest) -> Result<LogsResponse, SessionError> {
        self.post_json("logs", &request).await
    }

    async fn reset(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.post("reset", &request).await?;
        Ok(())
    }

    async fn streaming_chat(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatResponse, SessionError>>, SessionError> {
        let response = self.post("streaming_chat", &request).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport))
            .boxed();
        Ok(sse_responses(chunks))
    }
}

/// Incremental parser for a server-sent-events body.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes and return every complete event payload.
    fn feed(&mut self, chunk: &[u8]) -> Vec<Result<ChatResponse, SessionError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = parse_line(&String::from_utf8_lossy(&line)) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline.
    fn finish(&mut self) -> Option<Result<ChatResponse, SessionError>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<Result<ChatResponse, SessionError>> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(serde_json::from_str(data).map_err(|e| SessionError::Protocol(format!("bad event: {e}"))))
}

struct SseState {
    chunks: BoxStream<'static, Result<Vec<u8>, SessionError>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<ChatResponse, SessionError>>,
    finished: bool,
}

fn sse_responses(
    chunks: BoxStream<'static, Result<Vec<u8>, SessionError>>,
) -> BoxStream<'static, Result<ChatResponse, SessionError>> {
    let state = SseState {
        chunks,
        decoder: SseDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.decoder.feed(&chunk)),
                Some(Err(err)) => {
                    state.finished = true;
                    state.ready.push_back(Err(err));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{ChatMessage, ChatMessageType};

    fn event(text: &str) -> String {
        let response = ChatResponse {
            response: ChatMessage::new(ChatMessageType::Ai, text, Vec::new()),
        };
        format!("data: {}\n\n", serde_json::to_string(&response).unwrap())
    }

    #[test]
    fn urls_follow_the_agent_api_layout() {
        let session = HttpAgentSession::new(reqwest::Client::new(), "http://localhost:8080/", "math_guy");
        assert_eq!(session.url("function"), "http://localhost:8080/api/v1/math_guy/function");
    }

    #[test]
    fn decoder_handles_events_split_across_chunks() {
        let body = format!(": keep-alive\n{}{}", event("one"), event("two"));
        let (head, tail) = body.as_bytes().split_at(25);

        let mut decoder = SseDecoder::default();
        let mut items = decoder.feed(head);
        items.extend(decoder.feed(tail));

        let texts: Vec<_> = items.into_iter().map(|i| i.unwrap().response.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn malformed_events_are_protocol_errors() {
        let mut decoder = SseDecoder::default();
        let items = decoder.feed(b"data: {not json}\n");
        assert!(matches!(items[0], Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn stream_flushes_unterminated_last_event() {
        let body = event("last");
        let chunks = vec![Ok(body.trim_end().as_bytes().to_vec())];
        let responses: Vec<_> = sse_responses(stream::iter(chunks).boxed()).collect().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].as_ref().unwrap().response.text, "last");
    }
}
