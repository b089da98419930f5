// ABOUTME: The session interface through which agent networks are invoked, locally or remotely.
// ABOUTME: Defines request/response shapes, SessionError, external agent references and the factory.

pub mod direct;
pub mod http;
pub mod manager;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use switchboard_core::{ChatContext, ChatMessage, ChatMessageType, FunctionSpec, SlyMap};

pub use direct::DirectAgentSession;
pub use http::HttpAgentSession;
pub use manager::{SessionManager, TurnStatus};

/// Errors raised by a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The target does not serve this agent (HTTP 404 / unknown network).
    #[error("agent '{0}' is not available")]
    Unimplemented(String),

    #[error("unknown session id: {0}")]
    UnknownSession(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("agent failed: {0}")]
    Agent(String),
}

/// Description of the function an agent network's front man exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub function: FunctionSpec,
}

/// One agent's downstream tools as reported by connectivity queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityInfo {
    pub origin: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityResponse {
    pub connectivity_info: Vec<ConnectivityInfo>,
}

/// A user turn sent to an agent network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sly_data: Option<SlyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_context: Option<ChatContext>,
    /// Continue a polling-style conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_message: ChatMessage::new(ChatMessageType::Human, user_input, Vec::new()),
            sly_data: None,
            chat_context: None,
            session_id: None,
        }
    }

    pub fn with_chat_context(mut self, chat_context: Option<ChatContext>) -> Self {
        self.chat_context = chat_context;
        self
    }

    pub fn with_sly_data(mut self, sly_data: Option<SlyMap>) -> Self {
        self.sly_data = sly_data;
        self
    }
}

/// One streamed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: ChatMessage,
}

/// Reply to a polling-style chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStarted {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

/// Progress of a polling-style conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub session_id: String,
    pub status: TurnStatus,
    pub logs: Vec<String>,
    /// Final front-man answer once the turn completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_response: Option<String>,
    /// Failure of the last turn, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Capability set for invoking an agent network.
#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn function(&self) -> Result<FunctionResponse, SessionError>;

    async fn connectivity(&self) -> Result<ConnectivityResponse, SessionError>;

    /// Start a turn in the background and return its session id.
    async fn chat(&self, request: ChatRequest) -> Result<ChatStarted, SessionError>;

    async fn logs(&self, request: SessionRequest) -> Result<LogsResponse, SessionError>;

    async fn reset(&self, request: SessionRequest) -> Result<(), SessionError>;

    /// Run one turn, yielding every message as it is produced. The final
    /// item carries the chat context.
    async fn streaming_chat(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatResponse, SessionError>>, SessionError>;
}

/// Address of an agent served by another network service, parsed from a
/// tool name such as `/math_guy` or `http://host:8080/math_guy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAgentRef {
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub agent_name: String,
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;

impl ExternalAgentRef {
    /// Parse a tool reference. Returns `None` for plain in-network names;
    /// an external reference always has a `/agent` path.
    pub fn parse(reference: &str) -> Option<Self> {
        let (scheme, rest) = match reference.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (Some(scheme.to_string()), rest),
            Some(_) => return None,
            None => (None, reference),
        };

        let (authority, path) = rest.split_once('/')?;
        let agent_name = path.trim_matches('/');
        if agent_name.is_empty() || agent_name.contains('/') {
            return None;
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().ok()?)),
            None => (authority, None),
        };
        let host = if host.is_empty() { DEFAULT_HOST } else { host };

        Some(Self {
            scheme,
            host: host.to_string(),
            port,
            agent_name: agent_name.to_string(),
        })
    }

    pub fn is_external(reference: &str) -> bool {
        Self::parse(reference).is_some()
    }

    /// True when the reference names an agent this process may serve itself.
    pub fn is_local(&self) -> bool {
        self.scheme.is_none() && self.port.is_none() && self.host == DEFAULT_HOST
    }

    /// Base URL of the service hosting the agent.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.scheme.as_deref().unwrap_or("http"),
            self.host,
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }
}

/// Opens sessions to external agents.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(
        &self,
        reference: &ExternalAgentRef,
    ) -> Result<Box<dyn AgentSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_local_reference() {
        let r = ExternalAgentRef::parse("/math_guy").unwrap();
        assert_eq!(r.agent_name, "math_guy");
        assert_eq!(r.host, "localhost");
        assert!(r.is_local());
        assert_eq!(r.base_url(), "http://localhost:8080");
    }

    #[test]
    fn full_url_reference() {
        let r = ExternalAgentRef::parse("https://agents.example.com:9443/math_guy").unwrap();
        assert_eq!(r.scheme.as_deref(), Some("https"));
        assert_eq!(r.host, "agents.example.com");
        assert_eq!(r.port, Some(9443));
        assert!(!r.is_local());
        assert_eq!(r.base_url(), "https://agents.example.com:9443");
    }

    #[test]
    fn host_port_without_scheme() {
        let r = ExternalAgentRef::parse("remote:8081/helper").unwrap();
        assert_eq!(r.host, "remote");
        assert_eq!(r.port, Some(8081));
        assert_eq!(r.base_url(), "http://remote:8081");
    }

    #[test]
    fn plain_names_are_not_external() {
        assert!(!ExternalAgentRef::is_external("synonymizer"));
        assert!(!ExternalAgentRef::is_external("/"));
        assert!(!ExternalAgentRef::is_external("host:notaport/agent"));
    }

    #[test]
    fn chat_request_round_trips_through_json() {
        let request = ChatRequest::new("hello").with_sly_data(Some(SlyMap::new()));
        let json = serde_json::to_string(&request).unwrap();
        let back: ChatRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_message.text, "hello");
        assert!(back.chat_context.is_none());
    }
}
