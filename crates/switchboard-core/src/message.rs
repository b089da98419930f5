// ABOUTME: Message types flowing through agents: internal framework messages and the
// ABOUTME: canonical ChatMessage contract streamed to callers, plus conversions between them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chat_context::ChatContext;
use crate::origin::{Origin, OriginEntry};
use crate::sly_data::SlyMap;

/// A tool invocation requested by an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A message inside an agent's own conversation, as seen by the framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AgentMessage {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// The authoritative answer of a called tool, attributed to that tool's origin.
    AgentToolResult {
        content: String,
        tool_result_origin: Origin,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
    /// Informational output of an agent meant for people, not for the LLM.
    Agent {
        content: String,
    },
    AgentFramework {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structure: Option<Value>,
    },
    LegacyLogs {
        content: String,
    },
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        AgentMessage::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        AgentMessage::Human {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        AgentMessage::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        AgentMessage::Agent {
            content: content.into(),
        }
    }

    pub fn framework(content: impl Into<String>) -> Self {
        AgentMessage::AgentFramework {
            content: content.into(),
            structure: None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            AgentMessage::System { content }
            | AgentMessage::Human { content }
            | AgentMessage::Ai { content, .. }
            | AgentMessage::AgentToolResult { content, .. }
            | AgentMessage::Agent { content }
            | AgentMessage::AgentFramework { content, .. }
            | AgentMessage::LegacyLogs { content } => content,
        }
    }

    pub fn chat_type(&self) -> ChatMessageType {
        match self {
            AgentMessage::System { .. } => ChatMessageType::System,
            AgentMessage::Human { .. } => ChatMessageType::Human,
            AgentMessage::Ai { .. } => ChatMessageType::Ai,
            AgentMessage::AgentToolResult { .. } => ChatMessageType::AgentToolResult,
            AgentMessage::Agent { .. } => ChatMessageType::Agent,
            AgentMessage::AgentFramework { .. } => ChatMessageType::AgentFramework,
            AgentMessage::LegacyLogs { .. } => ChatMessageType::LegacyLogs,
        }
    }

    /// Tool calls requested by an AI message; empty for every other kind.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            AgentMessage::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Whether this message belongs in a chat history that may be replayed
    /// into an LLM later.
    pub fn is_context_relevant(&self) -> bool {
        matches!(
            self,
            AgentMessage::System { .. }
                | AgentMessage::Human { .. }
                | AgentMessage::Ai { .. }
                | AgentMessage::AgentToolResult { .. }
        )
    }

    /// Rebuild a framework message from its canonical chat form. Provider
    /// bookkeeping (tool call ids) does not survive the round trip.
    pub fn from_chat_message(message: &ChatMessage) -> Self {
        let content = message.text.clone();
        match message.message_type {
            ChatMessageType::System => AgentMessage::System { content },
            ChatMessageType::Human => AgentMessage::Human { content },
            ChatMessageType::Ai => AgentMessage::Ai {
                content,
                tool_calls: Vec::new(),
            },
            ChatMessageType::Tool | ChatMessageType::AgentToolResult => {
                AgentMessage::AgentToolResult {
                    content,
                    tool_result_origin: message.tool_result_origin.clone().unwrap_or_default(),
                    tool_call_id: None,
                }
            }
            ChatMessageType::Agent => AgentMessage::Agent { content },
            ChatMessageType::AgentFramework => AgentMessage::AgentFramework {
                content,
                structure: message.structure.clone(),
            },
            ChatMessageType::LegacyLogs => AgentMessage::LegacyLogs { content },
        }
    }
}

/// The closed set of chat message kinds exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMessageType {
    System,
    Human,
    Tool,
    Ai,
    Agent,
    AgentFramework,
    LegacyLogs,
    AgentToolResult,
}

/// The canonical unit streamed to callers and stored in chat contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_context: Option<ChatContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_origin: Option<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sly_data: Option<SlyMap>,
}

impl ChatMessage {
    pub fn new(message_type: ChatMessageType, text: impl Into<String>, origin: Origin) -> Self {
        Self {
            message_type,
            text: text.into(),
            origin,
            structure: None,
            chat_context: None,
            tool_result_origin: None,
            sly_data: None,
        }
    }

    /// Convert a framework message written at `origin` into its chat form.
    pub fn from_agent_message(message: &AgentMessage, origin: &[OriginEntry]) -> Self {
        let mut chat = ChatMessage::new(message.chat_type(), message.content(), origin.to_vec());
        match message {
            AgentMessage::Ai { tool_calls, .. } if !tool_calls.is_empty() => {
                chat.structure = Some(json!({ "tool_calls": tool_calls }));
            }
            AgentMessage::AgentToolResult {
                tool_result_origin, ..
            } => {
                chat.tool_result_origin = Some(tool_result_origin.clone());
            }
            AgentMessage::AgentFramework { structure, .. } => {
                chat.structure = structure.clone();
            }
            _ => {}
        }
        chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        vec![OriginEntry::new("front", 0)]
    }

    #[test]
    fn chat_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&ChatMessageType::AgentToolResult).unwrap();
        assert_eq!(json, "\"AGENT_TOOL_RESULT\"");
        let parsed: ChatMessageType = serde_json::from_str("\"AGENT_FRAMEWORK\"").unwrap();
        assert_eq!(parsed, ChatMessageType::AgentFramework);
    }

    #[test]
    fn chat_message_uses_type_field() {
        let msg = ChatMessage::new(ChatMessageType::Ai, "hello", origin());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "AI");
        assert_eq!(value["origin"][0]["tool"], "front");
        assert!(value.get("chat_context").is_none());
    }

    #[test]
    fn tool_result_keeps_its_origin() {
        let result_origin = vec![OriginEntry::new("front", 0), OriginEntry::new("child", 1)];
        let msg = AgentMessage::AgentToolResult {
            content: "42".to_string(),
            tool_result_origin: result_origin.clone(),
            tool_call_id: Some("call_1".to_string()),
        };
        let chat = ChatMessage::from_agent_message(&msg, &origin());
        assert_eq!(chat.message_type, ChatMessageType::AgentToolResult);
        assert_eq!(chat.tool_result_origin, Some(result_origin.clone()));

        let back = AgentMessage::from_chat_message(&chat);
        assert_eq!(
            back,
            AgentMessage::AgentToolResult {
                content: "42".to_string(),
                tool_result_origin: result_origin,
                tool_call_id: None,
            }
        );
    }

    #[test]
    fn ai_tool_calls_travel_in_structure() {
        let msg = AgentMessage::Ai {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "c1".to_string(),
                name: "synonymizer".to_string(),
                arguments: json!({ "word": "happy" }),
            }],
        };
        let chat = ChatMessage::from_agent_message(&msg, &origin());
        assert_eq!(chat.structure.unwrap()["tool_calls"][0]["name"], "synonymizer");
    }

    #[test]
    fn context_relevance() {
        assert!(AgentMessage::human("hi").is_context_relevant());
        assert!(AgentMessage::ai("yo").is_context_relevant());
        assert!(!AgentMessage::framework("note").is_context_relevant());
        assert!(!AgentMessage::agent("calling").is_context_relevant());
    }

    #[test]
    fn agent_message_tagged_by_role() {
        let value = serde_json::to_value(AgentMessage::human("hi")).unwrap();
        assert_eq!(value, json!({ "role": "human", "content": "hi" }));
    }
}
