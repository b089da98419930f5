// ABOUTME: Shared application state for the switchboard HTTP server.
// ABOUTME: Holds the agent services and the polling-session map, plus the idle-session pruner.

use std::sync::Arc;
use std::time::Duration;

use switchboard_agent::{AgentServices, DirectAgentSession, SessionManager};

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub services: AgentServices,
    pub sessions: Arc<SessionManager>,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(services: AgentServices, session_ttl: Duration) -> Self {
        Self {
            services,
            sessions: Arc::new(SessionManager::new(session_ttl)),
        }
    }

    /// Session onto the named network, or `None` if it is not served here.
    pub fn session(&self, agent: &str) -> Option<DirectAgentSession> {
        let registry = self.services.registry(agent)?;
        Some(DirectAgentSession::new(
            registry,
            self.services.clone(),
            self.sessions.clone(),
        ))
    }
}

/// Periodically drop polling sessions that have been idle past their TTL.
pub fn spawn_session_pruner(state: SharedState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let pruned = state.sessions.prune_idle(chrono::Utc::now()).await;
            if !pruned.is_empty() {
                tracing::info!(count = pruned.len(), "pruned idle sessions");
            }
        }
    })
}
