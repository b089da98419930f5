// ABOUTME: Top-level object of one conversation: owns the front man and drives user turns.
// ABOUTME: Streams every journaled message and ends each turn with a portable chat context.

use std::sync::Arc;

use serde_json::Map;
use switchboard_core::sly_data::TO_UPSTREAM_ALLOW_KEY;
use switchboard_core::{
    AgentMessage, AgentSpec, ChatContext, ChatMessage, ChatMessageType, CompoundJournal, Journal,
    Origin, OriginEntry, QueueJournal, SlyData, SlyDataRedactor, SlyMap, StreamItem, TextJournal,
};
use tokio::sync::{Mutex, mpsc};

use crate::error::AgentError;
use crate::invocation::InvocationContext;
use crate::registry::ToolRegistry;
use crate::services::AgentServices;
use crate::tools::FrontMan;

/// One conversation with an agent network.
///
/// Created uninitialized; the front man is set up on the first turn and
/// kept for later turns until [`ChatSession::delete_resources`].
pub struct ChatSession {
    registry: Arc<ToolRegistry>,
    invocation: Arc<InvocationContext>,
    logs: Arc<TextJournal>,
    queue: Arc<QueueJournal>,
    front_man: Mutex<Option<FrontMan>>,
    sly_data: SlyData,
}

/// Result of one completed turn.
struct Turn {
    origin: Origin,
    spec: Arc<AgentSpec>,
    history: Vec<AgentMessage>,
}

impl ChatSession {
    pub fn new(
        registry: Arc<ToolRegistry>,
        services: &AgentServices,
        chat_context: Option<ChatContext>,
    ) -> Self {
        let logs = Arc::new(TextJournal::new());
        let queue = Arc::new(QueueJournal::new());
        let journal: Arc<dyn Journal> =
            Arc::new(CompoundJournal::new(vec![logs.clone(), queue.clone()]));
        let invocation = InvocationContext::new(
            registry.clone(),
            services.llm_factory.clone(),
            services.session_factory(),
            services.coded_tools.clone(),
            journal,
            chat_context,
        )
        .with_retry_policy(services.retry_policy)
        .with_call_limits(services.call_limits);

        Self {
            registry,
            invocation: Arc::new(invocation),
            logs,
            queue,
            front_man: Mutex::new(None),
            sly_data: SlyData::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The conversation's shared sly data.
    pub fn sly_data(&self) -> &SlyData {
        &self.sly_data
    }

    /// Create the front man if it does not exist yet.
    pub async fn set_up(&self) -> Result<(), AgentError> {
        let mut front_man = self.front_man.lock().await;
        self.ensure_front_man(&mut front_man).await
    }

    async fn ensure_front_man(&self, slot: &mut Option<FrontMan>) -> Result<(), AgentError> {
        if slot.is_some() {
            return Ok(());
        }
        let spec = self.registry.find_front_man()?;
        let origin = self
            .invocation
            .origination
            .add_spec_name_to_origin(&[], &spec.name)
            .await?;
        tracing::info!(network = %self.registry.network_name(), front_man = %spec.name, "chat session set up");
        *slot = Some(FrontMan::new(
            self.invocation.clone(),
            spec,
            origin,
            self.sly_data.clone(),
            Map::new(),
        ));
        Ok(())
    }

    async fn run_turn(&self, user_input: &str, sly_data: Option<SlyMap>) -> Result<Turn, AgentError> {
        let mut slot = self.front_man.lock().await;
        self.ensure_front_man(&mut slot).await?;
        let Some(front_man) = slot.as_mut() else {
            return Err(AgentError::Config("front man was not created".to_string()));
        };

        if let Some(sly_data) = sly_data {
            self.sly_data.update(sly_data).await;
        }
        let history = front_man.submit_message(user_input).await?;
        Ok(Turn {
            origin: front_man.origin().to_vec(),
            spec: front_man.spec().clone(),
            history,
        })
    }

    /// Drive one user turn and return the front man's history as chat
    /// messages.
    pub async fn chat(
        &self,
        user_input: &str,
        sly_data: Option<SlyMap>,
    ) -> Result<Vec<ChatMessage>, AgentError> {
        let turn = self.run_turn(user_input, sly_data).await?;
        Ok(to_chat_messages(&turn.origin, &turn.history))
    }

    /// Like [`ChatSession::chat`], but every message is pushed to `sender`
    /// as it is journaled. The turn ends with a framework message carrying
    /// the chat context, followed by [`StreamItem::End`].
    pub async fn streaming_chat(
        &self,
        user_input: &str,
        sly_data: Option<SlyMap>,
        sender: mpsc::UnboundedSender<StreamItem>,
    ) -> Result<Vec<ChatMessage>, AgentError> {
        self.queue.attach(sender).await;

        match self.run_turn(user_input, sly_data).await {
            Ok(turn) => {
                let mut last = ChatMessage::new(ChatMessageType::AgentFramework, "", turn.origin.clone());
                last.chat_context = Some(Self::prepare_chat_context(&turn.origin, &turn.history));
                let upstream = SlyDataRedactor::new(TO_UPSTREAM_ALLOW_KEY)
                    .filter_spec(Some(&turn.spec), &self.sly_data.snapshot().await);
                if !upstream.is_empty() {
                    last.sly_data = Some(upstream);
                }
                self.queue.put(last).await;
                self.queue.end().await;
                Ok(to_chat_messages(&turn.origin, &turn.history))
            }
            Err(err) => {
                tracing::error!(network = %self.registry.network_name(), error = %err, "chat turn failed");
                self.queue
                    .put(ChatMessage::new(
                        ChatMessageType::AgentFramework,
                        format!("Error: {err}"),
                        Vec::new(),
                    ))
                    .await;
                self.queue.end().await;
                Err(err)
            }
        }
    }

    /// Snapshot of the front man's history for resuming elsewhere. Nested
    /// agents' histories are not captured.
    pub fn prepare_chat_context(origin: &[OriginEntry], messages: &[AgentMessage]) -> ChatContext {
        ChatContext::from_history(origin, messages)
    }

    /// Rendered journal lines so far.
    pub async fn get_logs(&self) -> Vec<String> {
        self.logs.get_logs().await
    }

    /// Tear down the conversation. In-flight loops stop at their next check.
    pub async fn delete_resources(&self) {
        self.invocation.tear_down();
        if let Some(mut front_man) = self.front_man.lock().await.take() {
            front_man.delete_resources().await;
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.invocation.is_torn_down()
    }
}

fn to_chat_messages(origin: &[OriginEntry], history: &[AgentMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| ChatMessage::from_agent_message(m, origin))
        .collect()
}

/// Text of the last AI message, the front man's answer for a turn.
pub fn final_answer(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.message_type == ChatMessageType::Ai && !m.text.is_empty())
        .map(|m| m.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLlmClient, services_for};
    use serde_json::{Value, json};

    fn front() -> Value {
        json!({
            "name": "front",
            "instructions": "You answer questions.",
            "function": {"description": "Front door"},
            "tools": ["synonymizer"],
            "allow": {"to_upstream": {"sly_data": {"total": true}}}
        })
    }

    fn synonymizer() -> Value {
        json!({
            "name": "synonymizer",
            "instructions": "Find synonyms for {word}.",
            "function": {
                "description": "Finds synonyms",
                "parameters": {"type": "object", "properties": {"word": {"type": "string"}}}
            }
        })
    }

    fn session(client: &ScriptedLlmClient) -> ChatSession {
        let services = services_for("net", vec![front(), synonymizer()], client);
        let registry = services.registry("net").unwrap();
        ChatSession::new(registry, &services, None)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamItem>) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn chat_returns_front_man_history() {
        let client = ScriptedLlmClient::new();
        client.push_text("Hi!");
        let session = session(&client);

        let messages = session.chat("hello", None).await.unwrap();
        let types: Vec<_> = messages.iter().map(|m| m.message_type).collect();
        assert_eq!(
            types,
            vec![ChatMessageType::System, ChatMessageType::Human, ChatMessageType::Ai]
        );
        assert_eq!(final_answer(&messages).as_deref(), Some("Hi!"));
        assert!(messages.iter().all(|m| m.origin == vec![OriginEntry::new("front", 0)]));
        assert!(session.get_logs().await.iter().any(|l| l == "front: Ai: Hi!"));
    }

    #[tokio::test]
    async fn second_turn_reuses_front_man() {
        let client = ScriptedLlmClient::new();
        client.push_text("one");
        client.push_text("two");
        let session = session(&client);

        session.chat("first", None).await.unwrap();
        let messages = session.chat("second", None).await.unwrap();
        assert_eq!(final_answer(&messages).as_deref(), Some("two"));
        assert_eq!(client.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn streaming_ends_with_chat_context_then_end_marker() {
        let client = ScriptedLlmClient::new();
        client.push_tool_call("synonymizer", json!({"word": "happy"}));
        client.push_text("joyful");
        client.push_text("Try joyful.");
        let session = session(&client);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut sly = SlyMap::new();
        sly.insert("total".into(), json!(3));
        sly.insert("secret".into(), json!("x"));
        session.streaming_chat("synonyms for happy", Some(sly), tx).await.unwrap();

        let items = drain(&mut rx);
        assert_eq!(items.last(), Some(&StreamItem::End));
        let StreamItem::Message(last) = &items[items.len() - 2] else {
            panic!("expected a message before the end marker");
        };
        assert_eq!(last.message_type, ChatMessageType::AgentFramework);
        let context = last.chat_context.as_ref().unwrap();
        assert_eq!(context.chat_histories.len(), 1);
        assert_eq!(context.chat_histories[0].origin, vec![OriginEntry::new("front", 0)]);
        assert_eq!(last.sly_data.as_ref().unwrap().keys().collect::<Vec<_>>(), vec!["total"]);

        let from_synonymizer = items.iter().any(|item| {
            matches!(item, StreamItem::Message(m)
                if m.origin.len() == 2 && m.origin[1].tool == "synonymizer")
        });
        assert!(from_synonymizer);
        assert!(items.iter().all(|item| !matches!(item,
            StreamItem::Message(m) if m.message_type == ChatMessageType::System)));
    }

    #[tokio::test]
    async fn sly_data_updates_are_visible_to_tools() {
        let client = ScriptedLlmClient::new();
        client.push_text("ok");
        let session = session(&client);

        let mut sly = SlyMap::new();
        sly.insert("user".into(), json!("ada"));
        session.chat("hi", Some(sly)).await.unwrap();
        assert_eq!(session.sly_data().get("user").await, Some(json!("ada")));
    }

    #[tokio::test]
    async fn configuration_errors_still_end_the_stream() {
        let client = ScriptedLlmClient::new();
        let services = services_for(
            "broken",
            vec![
                json!({"name": "a", "function": {"description": "a"}}),
                json!({"name": "b", "function": {"description": "b"}}),
            ],
            &client,
        );
        let session = ChatSession::new(services.registry("broken").unwrap(), &services, None);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = session.streaming_chat("hi", None, tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], StreamItem::End);
    }

    #[tokio::test]
    async fn delete_resources_tears_down() {
        let client = ScriptedLlmClient::new();
        client.push_text("ok");
        let session = session(&client);
        session.chat("hi", None).await.unwrap();

        session.delete_resources().await;
        assert!(session.is_torn_down());
        assert!(client.requests().len() == 1);
    }
}
