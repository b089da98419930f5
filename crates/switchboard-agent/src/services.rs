// ABOUTME: Process-wide runtime handle: loaded networks, LLM factory, coded tools, HTTP client.
// ABOUTME: Hands out chat sessions and the session factory used to reach external agents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::ChatContext;
use switchboard_store::{AGENT_TOOL_PATH_ENV, determine_agent_tool_path, load_manifest_networks};

use crate::chat_session::ChatSession;
use crate::client::LlmFactory;
use crate::coded_tool::CodedToolRegistry;
use crate::error::AgentError;
use crate::invocation::CallLimits;
use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::session::{
    AgentSession, DirectAgentSession, ExternalAgentRef, HttpAgentSession, SessionError,
    SessionFactory, SessionManager,
};

/// Everything needed to run conversations on the networks this process
/// serves. Cheap to clone.
#[derive(Clone)]
pub struct AgentServices {
    networks: Arc<HashMap<String, Arc<ToolRegistry>>>,
    pub llm_factory: Arc<dyn LlmFactory>,
    pub coded_tools: Arc<CodedToolRegistry>,
    pub retry_policy: RetryPolicy,
    pub call_limits: CallLimits,
    http: reqwest::Client,
}

impl AgentServices {
    pub fn new(
        networks: Vec<ToolRegistry>,
        llm_factory: Arc<dyn LlmFactory>,
        coded_tools: CodedToolRegistry,
    ) -> Self {
        let networks = networks
            .into_iter()
            .map(|registry| (registry.network_name().to_string(), Arc::new(registry)))
            .collect();
        Self {
            networks: Arc::new(networks),
            llm_factory,
            coded_tools: Arc::new(coded_tools),
            retry_policy: RetryPolicy::default(),
            call_limits: CallLimits::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Load every enabled network of a manifest.
    ///
    /// The coded-tool prefix comes from `tool_path`, then `AGENT_TOOL_PATH`,
    /// then a `coded_tools` directory beside the manifest's directory.
    pub fn from_manifest(
        manifest: &Path,
        tool_path: Option<&str>,
        llm_factory: Arc<dyn LlmFactory>,
        coded_tools: CodedToolRegistry,
    ) -> Result<Self, AgentError> {
        let networks = load_manifest_networks(manifest)?;
        let env_path = std::env::var(AGENT_TOOL_PATH_ENV).ok();
        let search_roots: Vec<PathBuf> = std::env::current_dir().into_iter().collect();
        let agent_tool_path = determine_agent_tool_path(
            tool_path,
            env_path.as_deref(),
            manifest.parent(),
            &search_roots,
        );
        tracing::info!(agent_tool_path = %agent_tool_path, networks = networks.len(), "agent services ready");

        let registries = networks
            .iter()
            .map(|network| ToolRegistry::from_network(network, agent_tool_path.clone()))
            .collect();
        Ok(Self::new(registries, llm_factory, coded_tools))
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_call_limits(mut self, call_limits: CallLimits) -> Self {
        self.call_limits = call_limits;
        self
    }

    pub fn registry(&self, agent: &str) -> Option<Arc<ToolRegistry>> {
        self.networks.get(agent).cloned()
    }

    /// Served network names, sorted.
    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn session_factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(DefaultSessionFactory {
            services: self.clone(),
        })
    }

    /// Start a new conversation with the named network.
    pub fn chat_session(
        &self,
        agent: &str,
        chat_context: Option<ChatContext>,
    ) -> Result<ChatSession, SessionError> {
        let registry = self
            .registry(agent)
            .ok_or_else(|| SessionError::Unimplemented(agent.to_string()))?;
        Ok(ChatSession::new(registry, self, chat_context))
    }
}

/// Serves local references from this process and everything else over HTTP.
pub struct DefaultSessionFactory {
    services: AgentServices,
}

#[async_trait]
impl SessionFactory for DefaultSessionFactory {
    async fn create_session(
        &self,
        reference: &ExternalAgentRef,
    ) -> Result<Box<dyn AgentSession>, SessionError> {
        if reference.is_local()
            && let Some(registry) = self.services.registry(&reference.agent_name)
        {
            tracing::debug!(agent = %reference.agent_name, "serving external reference in-process");
            return Ok(Box::new(DirectAgentSession::new(
                registry,
                self.services.clone(),
                Arc::new(SessionManager::default()),
            )));
        }
        Ok(Box::new(HttpAgentSession::new(
            self.services.http_client().clone(),
            reference.base_url(),
            reference.agent_name.clone(),
        )))
    }
}
