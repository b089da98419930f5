// ABOUTME: Locked map of live polling-style conversations keyed by ULID session id.
// ABOUTME: Tracks turn status and last activity; idle sessions are pruned after a TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::ChatMessage;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::chat_session::{ChatSession, final_answer};
use crate::session::SessionError;

/// Default idle time before a session is pruned.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Where a conversation's latest turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Idle,
    InProgress,
    Completed,
    Failed,
}

/// One live conversation.
pub struct LiveSession {
    pub agent: String,
    pub chat: Arc<ChatSession>,
    pub status: TurnStatus,
    pub messages: Vec<ChatMessage>,
    pub chat_response: Option<String>,
    pub error: Option<String>,
    pub last_active: DateTime<Utc>,
}

/// Point-in-time view of a session for polling.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub chat: Arc<ChatSession>,
    pub status: TurnStatus,
    pub messages: Vec<ChatMessage>,
    pub chat_response: Option<String>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<Ulid, LiveSession>>,
    ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

/// Parse a client-supplied session id.
pub fn parse_session_id(session_id: &str) -> Result<Ulid, SessionError> {
    Ulid::from_string(session_id).map_err(|_| SessionError::UnknownSession(session_id.to_string()))
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn insert(&self, agent: impl Into<String>, chat: Arc<ChatSession>) -> Ulid {
        let id = Ulid::new();
        let session = LiveSession {
            agent: agent.into(),
            chat,
            status: TurnStatus::Idle,
            messages: Vec::new(),
            chat_response: None,
            error: None,
            last_active: Utc::now(),
        };
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Mark a turn as started. Only one turn may be in flight per session.
    pub async fn begin_turn(&self, id: Ulid) -> Result<Arc<ChatSession>, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        if session.status == TurnStatus::InProgress {
            return Err(SessionError::Agent(format!(
                "session {id} already has a turn in progress"
            )));
        }
        session.status = TurnStatus::InProgress;
        session.error = None;
        session.last_active = Utc::now();
        Ok(session.chat.clone())
    }

    /// Record the outcome of a turn. Unknown ids are ignored; the session
    /// may have been reset while the turn ran.
    pub async fn finish_turn(&self, id: Ulid, outcome: Result<Vec<ChatMessage>, String>) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&id) else {
            tracing::debug!(session_id = %id, "turn finished for a removed session");
            return;
        };
        match outcome {
            Ok(messages) => {
                session.chat_response = final_answer(&messages);
                session.messages = messages;
                session.status = TurnStatus::Completed;
            }
            Err(error) => {
                session.error = Some(error);
                session.status = TurnStatus::Failed;
            }
        }
        session.last_active = Utc::now();
    }

    pub async fn snapshot(&self, id: Ulid) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.last_active = Utc::now();
        Some(SessionSnapshot {
            chat: session.chat.clone(),
            status: session.status,
            messages: session.messages.clone(),
            chat_response: session.chat_response.clone(),
        })
    }

    pub async fn error(&self, id: Ulid) -> Option<String> {
        self.sessions.read().await.get(&id)?.error.clone()
    }

    pub async fn remove(&self, id: Ulid) -> Option<LiveSession> {
        self.sessions.write().await.remove(&id)
    }

    /// Drop sessions idle longer than the TTL and tear them down. Sessions
    /// with a turn in flight are kept.
    pub async fn prune_idle(&self, now: DateTime<Utc>) -> Vec<Ulid> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expired: Vec<(Ulid, Arc<ChatSession>)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Ulid> = sessions
                .iter()
                .filter(|(_, s)| s.status != TurnStatus::InProgress && now - s.last_active > ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s.chat)))
                .collect()
        };

        for (id, chat) in &expired {
            tracing::info!(session_id = %id, "pruning idle session");
            chat.delete_resources().await;
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLlmClient, services_for};
    use serde_json::json;
    use switchboard_core::ChatMessageType;

    fn chat() -> Arc<ChatSession> {
        let client = ScriptedLlmClient::new();
        let services = services_for("net", vec![json!({"name": "front"})], &client);
        Arc::new(services.chat_session("net", None).unwrap())
    }

    #[tokio::test]
    async fn turn_lifecycle() {
        let manager = SessionManager::default();
        let id = manager.insert("net", chat()).await;

        manager.begin_turn(id).await.unwrap();
        assert!(manager.begin_turn(id).await.is_err(), "one turn at a time");

        let answer = ChatMessage::new(ChatMessageType::Ai, "done", Vec::new());
        manager.finish_turn(id, Ok(vec![answer])).await;
        let snapshot = manager.snapshot(id).await.unwrap();
        assert_eq!(snapshot.status, TurnStatus::Completed);
        assert_eq!(snapshot.chat_response.as_deref(), Some("done"));

        manager.begin_turn(id).await.unwrap();
        manager.finish_turn(id, Err("boom".into())).await;
        assert_eq!(manager.snapshot(id).await.unwrap().status, TurnStatus::Failed);
        assert_eq!(manager.error(id).await.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn prune_removes_only_idle_sessions() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let idle = manager.insert("net", chat()).await;
        let busy = manager.insert("net", chat()).await;
        manager.begin_turn(busy).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        let pruned = manager.prune_idle(later).await;
        assert_eq!(pruned, vec![idle]);
        assert_eq!(manager.len().await, 1);
        assert!(manager.snapshot(busy).await.is_some());
    }

    #[test]
    fn session_ids_must_be_ulids() {
        assert!(parse_session_id("nope").is_err());
        let id = Ulid::new();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
    }
}
