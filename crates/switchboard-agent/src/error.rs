// ABOUTME: Error type for the agent runtime.
// ABOUTME: Only structural failures surface here; conversational failures become chat messages.

use switchboard_core::OriginError;
use switchboard_store::StoreError;

use crate::session::SessionError;

/// Errors that escape the agent runtime to its caller.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A broken network definition: ambiguous front man, unknown tool,
    /// missing function. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to load agent networks: {0}")]
    Store(#[from] StoreError),
}
