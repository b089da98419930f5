// ABOUTME: Append-only, origin-tagged message sinks shared by every agent in a conversation.
// ABOUTME: Provides in-memory text logs, a streaming queue, fan-out, and an origin-stamping decorator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::message::{AgentMessage, ChatMessage, ChatMessageType};
use crate::origin::{DisplayOrigin, Origin, OriginEntry};

/// A chat history shared between a run context and the journal that appends to it.
pub type SharedHistory = Arc<Mutex<Vec<AgentMessage>>>;

/// Create an empty shared history.
pub fn new_history() -> SharedHistory {
    Arc::new(Mutex::new(Vec::new()))
}

/// Sink for everything agents say. Writes never fail; a sink that cannot
/// deliver drops the message and logs why.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Record a plain log line.
    async fn write(&self, text: &str, origin: Option<&[OriginEntry]>);

    /// Record a framework message.
    async fn write_message(&self, message: &AgentMessage, origin: Option<&[OriginEntry]>);

    /// Text logs accumulated so far, for polling-style consumers.
    async fn get_logs(&self) -> Vec<String>;
}

/// Keeps rendered log lines in memory.
#[derive(Debug, Default)]
pub struct TextJournal {
    logs: Mutex<Vec<String>>,
}

impl TextJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Journal for TextJournal {
    async fn write(&self, text: &str, origin: Option<&[OriginEntry]>) {
        let line = match origin {
            Some(origin) if !origin.is_empty() => format!("{}: {}", DisplayOrigin(origin), text),
            _ => text.to_string(),
        };
        self.logs.lock().await.push(line);
    }

    async fn write_message(&self, message: &AgentMessage, origin: Option<&[OriginEntry]>) {
        let text = format!("{:?}: {}", message.chat_type(), message.content());
        self.write(&text, origin).await;
    }

    async fn get_logs(&self) -> Vec<String> {
        self.logs.lock().await.clone()
    }
}

/// Items delivered to a streaming consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Message(ChatMessage),
    /// Nothing else will be sent for this turn.
    End,
}

/// Converts every message into a [`ChatMessage`] and pushes it onto a
/// streaming queue. The queue is attached per turn; with no queue attached
/// writes are dropped.
#[derive(Debug, Default)]
pub struct QueueJournal {
    sender: Mutex<Option<mpsc::UnboundedSender<StreamItem>>>,
}

impl QueueJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a journal already attached to a fresh queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub async fn attach(&self, sender: mpsc::UnboundedSender<StreamItem>) {
        *self.sender.lock().await = Some(sender);
    }

    pub async fn detach(&self) {
        *self.sender.lock().await = None;
    }

    /// Push an already-built chat message.
    pub async fn put(&self, message: ChatMessage) {
        self.send(StreamItem::Message(message)).await;
    }

    /// Push the end marker and detach the queue.
    pub async fn end(&self) {
        self.send(StreamItem::End).await;
        self.detach().await;
    }

    async fn send(&self, item: StreamItem) {
        let sender = self.sender.lock().await;
        if let Some(tx) = sender.as_ref()
            && tx.send(item).is_err()
        {
            tracing::debug!("streaming consumer went away; dropping message");
        }
    }
}

#[async_trait]
impl Journal for QueueJournal {
    async fn write(&self, text: &str, origin: Option<&[OriginEntry]>) {
        let origin: Origin = origin.map(<[OriginEntry]>::to_vec).unwrap_or_default();
        self.put(ChatMessage::new(ChatMessageType::LegacyLogs, text, origin))
            .await;
    }

    async fn write_message(&self, message: &AgentMessage, origin: Option<&[OriginEntry]>) {
        // Prompts are never streamed.
        if matches!(message, AgentMessage::System { .. }) {
            return;
        }
        let origin = origin.unwrap_or(&[]);
        self.put(ChatMessage::from_agent_message(message, origin)).await;
    }

    async fn get_logs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Fans every call out to a fixed list of journals.
pub struct CompoundJournal {
    journals: Vec<Arc<dyn Journal>>,
}

impl CompoundJournal {
    pub fn new(journals: Vec<Arc<dyn Journal>>) -> Self {
        Self { journals }
    }
}

#[async_trait]
impl Journal for CompoundJournal {
    async fn write(&self, text: &str, origin: Option<&[OriginEntry]>) {
        for journal in &self.journals {
            journal.write(text, origin).await;
        }
    }

    async fn write_message(&self, message: &AgentMessage, origin: Option<&[OriginEntry]>) {
        for journal in &self.journals {
            journal.write_message(message, origin).await;
        }
    }

    async fn get_logs(&self) -> Vec<String> {
        let mut logs = Vec::new();
        for journal in &self.journals {
            logs.extend(journal.get_logs().await);
        }
        logs
    }
}

/// Stamps a fixed origin on every write that does not carry its own, and
/// optionally mirrors replay-relevant messages into a chat history.
///
/// This is the only path through which a run context's history grows.
pub struct OriginatingJournal {
    inner: Arc<dyn Journal>,
    origin: Origin,
    chat_history: Option<SharedHistory>,
}

impl OriginatingJournal {
    pub fn new(inner: Arc<dyn Journal>, origin: Origin, chat_history: Option<SharedHistory>) -> Self {
        Self {
            inner,
            origin,
            chat_history,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }
}

#[async_trait]
impl Journal for OriginatingJournal {
    async fn write(&self, text: &str, origin: Option<&[OriginEntry]>) {
        let origin = origin.unwrap_or(&self.origin);
        self.inner.write(text, Some(origin)).await;
    }

    async fn write_message(&self, message: &AgentMessage, origin: Option<&[OriginEntry]>) {
        let origin = origin.unwrap_or(&self.origin);
        if let Some(history) = &self.chat_history
            && message.is_context_relevant()
        {
            history.lock().await.push(message.clone());
        }
        self.inner.write_message(message, Some(origin)).await;
    }

    async fn get_logs(&self) -> Vec<String> {
        self.inner.get_logs().await
    }
}
