// ABOUTME: Portable chat context snapshot used to resume a conversation on another process.
// ABOUTME: Maps origin paths to the chat histories owned by the tool instance at that origin.

use serde::{Deserialize, Serialize};

use crate::message::{AgentMessage, ChatMessage};
use crate::origin::{Origin, OriginEntry, get_full_name_from_origin};

/// The history owned by the tool instance at one origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    pub origin: Origin,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Serializable snapshot of the chat histories of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub chat_histories: Vec<ChatHistory>,
}

impl ChatContext {
    /// Build a context holding a single history for `origin`. Only messages
    /// relevant for replay are kept.
    pub fn from_history(origin: &[OriginEntry], messages: &[AgentMessage]) -> Self {
        let messages = messages
            .iter()
            .filter(|m| m.is_context_relevant())
            .map(|m| ChatMessage::from_agent_message(m, origin))
            .collect();
        Self {
            chat_histories: vec![ChatHistory {
                origin: origin.to_vec(),
                messages,
            }],
        }
    }

    /// Find the history whose origin renders to `full_name`. Entries with
    /// unrenderable origins never match.
    pub fn find_history(&self, full_name: &str) -> Option<&ChatHistory> {
        self.chat_histories.iter().find(|history| {
            get_full_name_from_origin(&history.origin)
                .map(|name| name == full_name)
                .unwrap_or(false)
        })
    }

    /// Framework messages to seed the history of the tool at `origin`, or
    /// `None` if this context holds nothing for it.
    pub fn restore_messages(&self, origin: &[OriginEntry]) -> Option<Vec<AgentMessage>> {
        let full_name = get_full_name_from_origin(origin).ok()?;
        let history = self.find_history(&full_name)?;
        Some(
            history
                .messages
                .iter()
                .map(AgentMessage::from_chat_message)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.chat_histories.is_empty()
    }
}
