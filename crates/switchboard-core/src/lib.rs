// ABOUTME: Core library for switchboard: the data model shared by every agent network component.
// ABOUTME: Origins, sly data and its redactor, agent specs, chat messages, chat contexts, journals.

pub mod chat_context;
pub mod journal;
pub mod message;
pub mod origin;
pub mod prompt;
pub mod sly_data;
pub mod spec;

pub use chat_context::{ChatContext, ChatHistory};
pub use journal::{
    CompoundJournal, Journal, OriginatingJournal, QueueJournal, SharedHistory, StreamItem,
    TextJournal, new_history,
};
pub use message::{AgentMessage, ChatMessage, ChatMessageType, ToolCall};
pub use origin::{
    DisplayOrigin, Origin, OriginEntry, OriginError, Origination, get_full_name_from_origin,
    origin_from_full_name,
};
pub use sly_data::{SlyData, SlyDataRedactor, SlyMap};
pub use spec::{AgentSpec, FunctionSpec, LlmConfig, SpecError, SpecShape};
