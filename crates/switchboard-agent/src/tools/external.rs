// ABOUTME: Tool that proxies a call to an agent network reached through a session.
// ABOUTME: Redacts sly data on the way out and filters what comes back before merging it.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Map, Value};
use switchboard_core::sly_data::FROM_DOWNSTREAM_ALLOW_KEY;
use switchboard_core::{
    AgentMessage, AgentSpec, ChatMessage, ChatMessageType, Journal, Origin, OriginEntry, SlyData,
    SlyDataRedactor, SlyMap,
};

use crate::error::AgentError;
use crate::session::{AgentSession, ChatRequest, ExternalAgentRef, SessionError, SessionFactory};

pub struct ExternalTool {
    reference_name: String,
    reference: ExternalAgentRef,
    origin: Origin,
    arguments: Map<String, Value>,
    outbound_sly: SlyMap,
    shared_sly: SlyData,
    parent_spec: Option<Arc<AgentSpec>>,
    session_factory: Arc<dyn SessionFactory>,
    journal: Arc<dyn Journal>,
    session: Option<Box<dyn AgentSession>>,
}

impl ExternalTool {
    /// `outbound_sly` must already be redacted for the downstream agent.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference_name: impl Into<String>,
        reference: ExternalAgentRef,
        origin: Origin,
        arguments: Map<String, Value>,
        outbound_sly: SlyMap,
        shared_sly: SlyData,
        parent_spec: Option<Arc<AgentSpec>>,
        session_factory: Arc<dyn SessionFactory>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            reference,
            origin,
            arguments,
            outbound_sly,
            shared_sly,
            parent_spec,
            session_factory,
            journal,
            session: None,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    /// Send the arguments as one chat turn and return the remote answer.
    /// Failures become the answer text so the calling agent can react.
    pub async fn build(&mut self) -> Result<Vec<AgentMessage>, AgentError> {
        let answer = match self.converse().await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(tool = %self.reference_name, error = %err, "external agent call failed");
                format!("Error: {err}")
            }
        };
        let reply = AgentMessage::ai(answer);
        self.journal.write_message(&reply, Some(&self.origin)).await;
        Ok(vec![reply])
    }

    async fn converse(&mut self) -> Result<String, SessionError> {
        if self.session.is_none() {
            self.session = Some(self.session_factory.create_session(&self.reference).await?);
        }
        let Some(session) = self.session.as_ref() else {
            return Err(SessionError::Unimplemented(self.reference_name.clone()));
        };

        let input = serde_json::to_string(&self.arguments)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        let request = ChatRequest::new(input).with_sly_data(Some(self.outbound_sly.clone()));

        let mut stream = session.streaming_chat(request).await?;
        let mut answers = Vec::new();
        while let Some(item) = stream.next().await {
            let message = item?.response;
            if let Some(returned) = &message.sly_data {
                self.merge_returned_sly(returned).await;
            }
            if message.chat_context.is_some() {
                continue;
            }
            if is_front_man_answer(&message) {
                answers.push(message.text.clone());
            }
            self.forward(&message).await;
        }

        answers.pop().ok_or_else(|| {
            SessionError::Protocol(format!("No response from {}", self.reference_name))
        })
    }

    async fn merge_returned_sly(&self, returned: &SlyMap) {
        let redactor = SlyDataRedactor::new(FROM_DOWNSTREAM_ALLOW_KEY);
        let accepted = redactor.filter_spec(self.parent_spec.as_deref(), returned);
        if !accepted.is_empty() {
            self.shared_sly.update(accepted).await;
        }
    }

    /// Re-journal a remote message under this tool's origin.
    async fn forward(&self, message: &ChatMessage) {
        let mut origin = self.origin.clone();
        origin.extend(message.origin.iter().cloned());
        self.journal
            .write_message(&AgentMessage::from_chat_message(message), Some(&origin))
            .await;
    }

    pub async fn delete_resources(&mut self) {
        self.session = None;
    }
}

fn is_front_man_answer(message: &ChatMessage) -> bool {
    message.message_type == ChatMessageType::Ai
        && message.origin.len() <= 1
        && !message.text.trim().is_empty()
}
