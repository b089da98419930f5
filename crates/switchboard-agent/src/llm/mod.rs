// ABOUTME: Provider-agnostic LLM request/response model and the LlmClient trait.
// ABOUTME: Converts framework chat histories into role-alternating provider messages.

pub mod anthropic;
pub mod openai;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::{AgentMessage, ToolCall};

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// Errors that can occur while talking to an LLM provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("missing API key: {0}")]
    MissingKey(String),

    /// The provider answered but the answer could not be turned into a
    /// message. The text may contain the raw answer.
    #[error("output parsing error: {0}")]
    OutputParsing(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl Request {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }
}

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub model: String,
}

impl Response {
    /// All text blocks joined together.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// A chat-completion capable model endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn create_message(&self, request: &Request) -> Result<Response, LlmError>;

    /// Provider name for logging (e.g. "anthropic").
    fn provider_name(&self) -> &str;
}

/// Split a framework history into a system prompt and provider messages.
///
/// System messages become the system prompt. Tool results whose call id is
/// unknown (restored from a chat context) become plain user text, and tool
/// calls without a matching result are dropped so the exchange stays
/// well-formed. Framework, agent and log messages are not model input.
/// Consecutive messages with the same role are merged.
pub fn to_llm_messages(history: &[AgentMessage]) -> (Option<String>, Vec<LlmMessage>) {
    let answered: HashSet<&str> = history
        .iter()
        .filter_map(|m| match m {
            AgentMessage::AgentToolResult {
                tool_call_id: Some(id),
                ..
            } => Some(id.as_str()),
            _ => None,
        })
        .collect();

    let mut system: Vec<&str> = Vec::new();
    let mut messages = Vec::new();

    for message in history {
        match message {
            AgentMessage::System { content } => system.push(content),
            AgentMessage::Human { content } => {
                messages.push(LlmMessage {
                    role: Role::User,
                    content: vec![ContentBlock::text(content.clone())],
                });
            }
            AgentMessage::Ai {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if !content.trim().is_empty() {
                    blocks.push(ContentBlock::text(content.clone()));
                }
                for call in tool_calls.iter().filter(|c| answered.contains(c.id.as_str())) {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if !blocks.is_empty() {
                    messages.push(LlmMessage {
                        role: Role::Assistant,
                        content: blocks,
                    });
                }
            }
            AgentMessage::AgentToolResult {
                content,
                tool_call_id,
                ..
            } => {
                let block = match tool_call_id {
                    Some(id) => ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: content.clone(),
                    },
                    None => ContentBlock::text(content.clone()),
                };
                messages.push(LlmMessage {
                    role: Role::User,
                    content: vec![block],
                });
            }
            AgentMessage::Agent { .. }
            | AgentMessage::AgentFramework { .. }
            | AgentMessage::LegacyLogs { .. } => {}
        }
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, coalesce_messages(messages))
}

/// Merge consecutive messages with the same role. Providers require
/// alternating user/assistant turns.
pub fn coalesce_messages(messages: Vec<LlmMessage>) -> Vec<LlmMessage> {
    let mut result: Vec<LlmMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if let Some(last) = result.last_mut()
            && last.role == message.role
        {
            last.content.extend(message.content);
            continue;
        }
        result.push(message);
    }
    result
}
