// ABOUTME: Test doubles for the agent runtime: a scripted LLM client and unreachable sessions.
// ABOUTME: Compiled for unit tests and for downstream crates' tests via `pub mod testing`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{AgentSpec, ChatContext, Journal, LlmConfig, TextJournal};

use crate::client::LlmFactory;
use crate::coded_tool::CodedToolRegistry;
use crate::invocation::InvocationContext;
use crate::llm::{ContentBlock, LlmClient, LlmError, Request, Response, StopReason};
use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::services::AgentServices;
use crate::session::{AgentSession, ExternalAgentRef, SessionError, SessionFactory};

/// Answer given once the script runs out.
pub const DEFAULT_REPLY: &str = "Done.";

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Response, LlmError>>,
    requests: Vec<Request>,
    next_call: usize,
}

/// LLM client that answers from a queue of canned replies and records
/// every request. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, reply: Result<Response, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.replies.push_back(reply);
        }
    }

    pub fn push_text(&self, text: &str) {
        self.push(Ok(text_response(text)));
    }

    /// Queue a single tool call. Call ids are `call_0`, `call_1`, ...
    pub fn push_tool_call(&self, name: &str, arguments: Value) {
        let id = match self.script.lock() {
            Ok(mut script) => {
                let id = format!("call_{}", script.next_call);
                script.next_call += 1;
                id
            }
            Err(_) => "call_x".to_string(),
        };
        self.push(Ok(Response {
            id: format!("msg_{id}"),
            content: vec![ContentBlock::ToolUse {
                id,
                name: name.to_string(),
                input: arguments,
            }],
            stop_reason: StopReason::ToolUse,
            model: "scripted".to_string(),
        }));
    }

    pub fn push_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.script
            .lock()
            .map(|script| script.requests.clone())
            .unwrap_or_default()
    }

    /// A factory that hands out this client for every agent.
    pub fn factory(&self) -> ScriptedLlmFactory {
        ScriptedLlmFactory {
            client: self.clone(),
        }
    }
}

fn text_response(text: &str) -> Response {
    Response {
        id: "msg_text".to_string(),
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        model: "scripted".to_string(),
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn create_message(&self, request: &Request) -> Result<Response, LlmError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| LlmError::Config("scripted client poisoned".to_string()))?;
        script.requests.push(request.clone());
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(text_response(DEFAULT_REPLY)))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedLlmFactory {
    client: ScriptedLlmClient,
}

impl LlmFactory for ScriptedLlmFactory {
    fn create(&self, config: &LlmConfig) -> Result<(Arc<dyn LlmClient>, String), anyhow::Error> {
        let model = config
            .model_name
            .clone()
            .unwrap_or_else(|| "scripted-model".to_string());
        Ok((Arc::new(self.client.clone()), model))
    }
}

/// Session factory for which every external agent is unreachable.
pub struct UnavailableSessionFactory;

#[async_trait]
impl SessionFactory for UnavailableSessionFactory {
    async fn create_session(
        &self,
        reference: &ExternalAgentRef,
    ) -> Result<Box<dyn AgentSession>, SessionError> {
        Err(SessionError::Unimplemented(reference.agent_name.clone()))
    }
}

/// Retry policy without sleeps.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::ZERO,
    }
}

fn registry_of(name: &str, specs: Vec<Value>) -> ToolRegistry {
    let mut registry = ToolRegistry::new(name, "coded_tools");
    for spec in specs {
        match AgentSpec::from_value(spec) {
            Ok(spec) => registry.register(spec),
            Err(err) => panic!("invalid test spec: {err}"),
        }
    }
    registry
}

/// Invocation context over the given specs, answering from `client`.
pub fn invocation_for(
    specs: Vec<Value>,
    client: &ScriptedLlmClient,
    chat_context: Option<ChatContext>,
) -> Arc<InvocationContext> {
    invocation_with_journal(specs, client, chat_context, Arc::new(TextJournal::new()))
}

pub fn invocation_with_journal(
    specs: Vec<Value>,
    client: &ScriptedLlmClient,
    chat_context: Option<ChatContext>,
    journal: Arc<dyn Journal>,
) -> Arc<InvocationContext> {
    let invocation = InvocationContext::new(
        Arc::new(registry_of("test", specs)),
        Arc::new(client.factory()),
        Arc::new(UnavailableSessionFactory),
        Arc::new(CodedToolRegistry::new()),
        journal,
        chat_context,
    )
    .with_retry_policy(fast_retry_policy());
    Arc::new(invocation)
}

/// Services serving one network named `network`.
pub fn services_for(network: &str, specs: Vec<Value>, client: &ScriptedLlmClient) -> AgentServices {
    AgentServices::new(
        vec![registry_of(network, specs)],
        Arc::new(client.factory()),
        CodedToolRegistry::new(),
    )
    .with_retry_policy(fast_retry_policy())
}
