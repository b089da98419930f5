// ABOUTME: In-process session onto an agent network served by this process.
// ABOUTME: Polling turns run as spawned tasks; streaming turns use a fresh chat session each.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future;
use futures::stream::BoxStream;
use switchboard_core::{StreamItem, TextJournal};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::chat_session::ChatSession;
use crate::connectivity::report_network_connectivity;
use crate::error::AgentError;
use crate::registry::ToolRegistry;
use crate::services::AgentServices;
use crate::session::manager::parse_session_id;
use crate::session::{
    AgentSession, ChatRequest, ChatResponse, ChatStarted, ConnectivityResponse, FunctionResponse,
    LogsResponse, SessionError, SessionManager, SessionRequest,
};

pub struct DirectAgentSession {
    registry: Arc<ToolRegistry>,
    services: AgentServices,
    sessions: Arc<SessionManager>,
}

impl DirectAgentSession {
    pub fn new(registry: Arc<ToolRegistry>, services: AgentServices, sessions: Arc<SessionManager>) -> Self {
        Self {
            registry,
            services,
            sessions,
        }
    }

    fn new_chat(&self, request: &ChatRequest) -> ChatSession {
        ChatSession::new(self.registry.clone(), &self.services, request.chat_context.clone())
    }
}

fn agent_error(err: AgentError) -> SessionError {
    SessionError::Agent(err.to_string())
}

#[async_trait]
impl AgentSession for DirectAgentSession {
    async fn function(&self) -> Result<FunctionResponse, SessionError> {
        let front_man = self.registry.find_front_man().map_err(agent_error)?;
        Ok(FunctionResponse {
            function: front_man.function.clone().unwrap_or_default(),
        })
    }

    async fn connectivity(&self) -> Result<ConnectivityResponse, SessionError> {
        let journal = TextJournal::new();
        let connectivity_info = report_network_connectivity(&self.registry, &journal)
            .await
            .map_err(agent_error)?;
        Ok(ConnectivityResponse { connectivity_info })
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatStarted, SessionError> {
        let id = match request.session_id.as_deref() {
            Some(existing) => parse_session_id(existing)?,
            None => {
                let chat = Arc::new(self.new_chat(&request));
                self.sessions.insert(self.registry.network_name(), chat).await
            }
        };
        let chat = self.sessions.begin_turn(id).await?;

        let sessions = self.sessions.clone();
        let user_input = request.user_message.text;
        let sly_data = request.sly_data;
        tokio::spawn(async move {
            let outcome = chat
                .chat(&user_input, sly_data)
                .await
                .map_err(|err| err.to_string());
            if let Err(err) = &outcome {
                tracing::warn!(session_id = %id, error = %err, "polling turn failed");
            }
            sessions.finish_turn(id, outcome).await;
        });

        Ok(ChatStarted {
            session_id: id.to_string(),
        })
    }

    async fn logs(&self, request: SessionRequest) -> Result<LogsResponse, SessionError> {
        let id = parse_session_id(&request.session_id)?;
        let snapshot = self
            .sessions
            .snapshot(id)
            .await
            .ok_or_else(|| SessionError::UnknownSession(request.session_id.clone()))?;
        Ok(LogsResponse {
            session_id: request.session_id,
            status: snapshot.status,
            logs: snapshot.chat.get_logs().await,
            chat_response: snapshot.chat_response,
            error: self.sessions.error(id).await,
            messages: snapshot.messages,
        })
    }

    async fn reset(&self, request: SessionRequest) -> Result<(), SessionError> {
        let id = parse_session_id(&request.session_id)?;
        let removed = self
            .sessions
            .remove(id)
            .await
            .ok_or_else(|| SessionError::UnknownSession(request.session_id.clone()))?;
        removed.chat.delete_resources().await;
        Ok(())
    }

    async fn streaming_chat(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatResponse, SessionError>>, SessionError> {
        let chat = self.new_chat(&request);
        let (sender, receiver) = mpsc::unbounded_channel();

        let user_input = request.user_message.text;
        let sly_data = request.sly_data;
        tokio::spawn(async move {
            if let Err(err) = chat.streaming_chat(&user_input, sly_data, sender).await {
                tracing::warn!(error = %err, "streaming turn failed");
            }
            chat.delete_resources().await;
        });

        let responses = UnboundedReceiverStream::new(receiver)
            .take_while(|item| future::ready(matches!(item, StreamItem::Message(_))))
            .filter_map(|item| {
                future::ready(match item {
                    StreamItem::Message(response) => Some(Ok(ChatResponse { response })),
                    StreamItem::End => None,
                })
            });
        Ok(responses.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnStatus;
    use crate::testing::{ScriptedLlmClient, services_for};
    use serde_json::json;
    use std::time::Duration;
    use switchboard_core::ChatMessageType;

    fn direct(client: &ScriptedLlmClient) -> DirectAgentSession {
        let services = services_for(
            "net",
            vec![
                json!({"name": "front", "instructions": "Answer.", "function": {"description": "Answers things"}}),
            ],
            client,
        );
        let registry = services.registry("net").unwrap();
        DirectAgentSession::new(registry, services, Arc::new(SessionManager::default()))
    }

    #[tokio::test]
    async fn function_is_the_front_mans() {
        let session = direct(&ScriptedLlmClient::new());
        let function = session.function().await.unwrap();
        assert_eq!(function.function.description, "Answers things");
    }

    #[tokio::test]
    async fn streaming_yields_messages_until_end() {
        let client = ScriptedLlmClient::new();
        client.push_text("42");
        let session = direct(&client);

        let stream = session.streaming_chat(ChatRequest::new("meaning?")).await.unwrap();
        let responses: Vec<_> = stream.collect().await;
        let messages: Vec<_> = responses.into_iter().map(|r| r.unwrap().response).collect();

        let types: Vec<_> = messages.iter().map(|m| m.message_type).collect();
        assert_eq!(
            types,
            vec![ChatMessageType::Human, ChatMessageType::Ai, ChatMessageType::AgentFramework]
        );
        assert!(messages.last().unwrap().chat_context.is_some());
    }

    #[tokio::test]
    async fn polling_chat_completes_and_resets() {
        let client = ScriptedLlmClient::new();
        client.push_text("pong");
        let session = direct(&client);

        let started = session.chat(ChatRequest::new("ping")).await.unwrap();
        let request = SessionRequest {
            session_id: started.session_id.clone(),
        };

        let mut logs = session.logs(request.clone()).await.unwrap();
        for _ in 0..100 {
            if logs.status == TurnStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            logs = session.logs(request.clone()).await.unwrap();
        }
        assert_eq!(logs.status, TurnStatus::Completed);
        assert_eq!(logs.chat_response.as_deref(), Some("pong"));
        assert!(!logs.logs.is_empty());

        session.reset(request.clone()).await.unwrap();
        assert!(matches!(
            session.logs(request).await,
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn unknown_session_ids_are_rejected() {
        let session = direct(&ScriptedLlmClient::new());
        let mut request = ChatRequest::new("hi");
        request.session_id = Some(ulid::Ulid::new().to_string());
        assert!(matches!(
            session.chat(request).await,
            Err(SessionError::UnknownSession(_))
        ));
    }
}
