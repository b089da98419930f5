// ABOUTME: Per-tool-instance LLM run engine: prompt assembly, tool definitions, and the call/retry cycle.
// ABOUTME: All history growth goes through an origin-stamping journal; chat contexts seed resumed history.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use switchboard_core::{
    AgentMessage, AgentSpec, DisplayOrigin, FunctionSpec, Journal, LlmConfig, Origin, OriginEntry,
    OriginatingJournal, SharedHistory, SlyData, ToolCall, new_history,
};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::error::AgentError;
use crate::invocation::{InvocationContext, ParentContext};
use crate::llm::{LlmClient, LlmError, Request, ToolDefinition, to_llm_messages};
use crate::retry::{RetryDecision, exception_message};
use crate::session::ExternalAgentRef;

const MAX_TOOL_NAME_LEN: usize = 64;

/// Upper bound on LLM calls per turn when a spec sets none.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Final message when a turn exceeds its iteration or time budget.
pub const LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

/// Lifecycle of a run context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    ResourcesCreated,
    Submitted,
    Running,
    RequiresAction,
    ToolCallsSubmitted,
    ResponseReady,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Submitted,
    RequiresAction,
    Completed,
    /// The run context was torn down mid-flight.
    Cancelled,
}

/// Handle for one submit/wait cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: Ulid,
    pub status: RunStatus,
    /// Calls the model asked for when `status` is `RequiresAction`.
    pub tool_calls: Vec<ToolCall>,
}

impl Run {
    fn new(status: RunStatus) -> Self {
        Self {
            id: Ulid::new(),
            status,
            tool_calls: Vec::new(),
        }
    }

    pub fn requires_action(&self) -> bool {
        self.status == RunStatus::RequiresAction
    }

    fn cancelled(mut self) -> Self {
        self.status = RunStatus::Cancelled;
        self.tool_calls.clear();
        self
    }
}

/// The JSON-encoded result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    /// Origin of the tool instance that produced the output.
    pub origin: Origin,
    pub output: String,
}

enum Outcome {
    Answer {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Stopped(String),
}

/// Drives the LLM for one tool instance.
pub struct RunContext {
    invocation: Arc<InvocationContext>,
    spec: Arc<AgentSpec>,
    origin: Origin,
    sly_data: SlyData,
    history: SharedHistory,
    journal: Arc<dyn Journal>,
    resumed: bool,
    llm: Option<(Arc<dyn LlmClient>, String)>,
    llm_config: LlmConfig,
    tools: Vec<ToolDefinition>,
    /// LLM-facing tool name -> name as declared in the spec.
    tool_names: HashMap<String, String>,
    pending: Vec<AgentMessage>,
    state: RunState,
    iterations: u32,
    turn_started: Option<Instant>,
}

impl RunContext {
    /// Create a run context. If the conversation's chat context holds a
    /// history for `origin`, that history becomes the starting history.
    pub fn new(
        invocation: Arc<InvocationContext>,
        spec: Arc<AgentSpec>,
        origin: Origin,
        sly_data: SlyData,
    ) -> Self {
        let restored = invocation
            .chat_context
            .as_ref()
            .and_then(|ctx| ctx.restore_messages(&origin));
        let resumed = restored.is_some();
        let history = match restored {
            Some(messages) => Arc::new(Mutex::new(messages)),
            None => new_history(),
        };
        if resumed {
            tracing::debug!(origin = %DisplayOrigin(&origin), "resuming history from chat context");
        }

        let journal: Arc<dyn Journal> = Arc::new(OriginatingJournal::new(
            invocation.journal.clone(),
            origin.clone(),
            Some(history.clone()),
        ));

        Self {
            invocation,
            spec,
            origin,
            sly_data,
            history,
            journal,
            resumed,
            llm: None,
            llm_config: LlmConfig::default(),
            tools: Vec::new(),
            tool_names: HashMap::new(),
            pending: Vec::new(),
            state: RunState::Created,
            iterations: 0,
            turn_started: None,
        }
    }

    /// Resolve child tools, set up the prompt, and create the LLM.
    ///
    /// External tools that cannot be reached are left out with a framework
    /// message; unknown names are configuration errors.
    pub async fn create_resources(
        &mut self,
        instructions: &str,
        tool_names: &[String],
    ) -> Result<(), AgentError> {
        if self.is_torn_down() {
            return Ok(());
        }

        self.llm_config = self.spec.llm_config.clone().unwrap_or_default();
        let llm = self
            .invocation
            .llm_factory
            .create(&self.llm_config)
            .map_err(|e| {
                AgentError::Config(format!(
                    "agent '{}' could not create its LLM: {e:#}",
                    self.spec.name
                ))
            })?;
        self.llm = Some(llm);

        for name in tool_names {
            self.add_tool(name).await?;
        }

        if self.resumed {
            let mut history = self.history.lock().await;
            let system = AgentMessage::system(instructions);
            match history
                .iter_mut()
                .find(|m| matches!(m, AgentMessage::System { .. }))
            {
                Some(first) => *first = system,
                None => history.insert(0, system),
            }
        } else {
            self.journal
                .write_message(&AgentMessage::system(instructions), None)
                .await;
        }

        self.state = RunState::ResourcesCreated;
        tracing::debug!(
            agent = %self.spec.name,
            origin = %DisplayOrigin(&self.origin),
            tools = self.tools.len(),
            "run context resources created"
        );
        Ok(())
    }

    async fn add_tool(&mut self, name: &str) -> Result<(), AgentError> {
        if let Some(child) = self.invocation.registry.get(name) {
            let function = child.function.as_ref().ok_or_else(|| {
                AgentError::Config(format!(
                    "tool '{name}' used by '{}' has no function definition",
                    self.spec.name
                ))
            })?;
            self.define_tool(name, function);
            return Ok(());
        }

        let Some(reference) = ExternalAgentRef::parse(name) else {
            return Err(AgentError::Config(format!(
                "agent '{}' refers to unknown tool '{name}'",
                self.spec.name
            )));
        };

        let fetched = match self
            .invocation
            .session_factory
            .create_session(&reference)
            .await
        {
            Ok(session) => session.function().await,
            Err(err) => Err(err),
        };
        match fetched {
            Ok(response) => self.define_tool(name, &response.function),
            Err(err) => {
                tracing::warn!(tool = %name, error = %err, "external tool unavailable");
                self.journal
                    .write_message(
                        &AgentMessage::framework(format!(
                            "Tool {name} is unavailable and will not be used this turn: {err}"
                        )),
                        None,
                    )
                    .await;
            }
        }
        Ok(())
    }

    fn define_tool(&mut self, name: &str, function: &FunctionSpec) {
        if self.tool_names.values().any(|existing| existing == name) {
            return;
        }
        let llm_name = unique_llm_name(&llm_tool_name(name), |candidate| {
            self.tool_names.contains_key(candidate)
        });
        let input_schema = function
            .parameters
            .clone()
            .filter(|p| !p.is_null())
            .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
        self.tools.push(ToolDefinition {
            name: llm_name.clone(),
            description: function.description.clone(),
            input_schema,
        });
        self.tool_names.insert(llm_name, name.to_string());
    }

    /// Record a new human turn and return its run. Nothing is appended to
    /// history until the run is waited on.
    pub fn submit_message(&mut self, user_message: &str) -> Run {
        if self.is_torn_down() {
            return Run::new(RunStatus::Cancelled);
        }
        self.pending = vec![AgentMessage::human(user_message)];
        self.iterations = 0;
        self.turn_started = Some(Instant::now());
        self.state = RunState::Submitted;
        Run::new(RunStatus::Submitted)
    }

    /// Invoke the LLM once for the pending input, then journal the pending
    /// messages followed by the model's reply.
    pub async fn wait_on_run(&mut self, run: Run) -> Result<Run, AgentError> {
        if run.status == RunStatus::Cancelled || self.is_torn_down() {
            return Ok(run.cancelled());
        }
        let Some((client, model)) = self.llm.clone() else {
            return Err(AgentError::Config(format!(
                "run context for '{}' has no resources",
                self.spec.name
            )));
        };

        self.state = RunState::Running;
        self.iterations += 1;
        let pending = std::mem::take(&mut self.pending);

        let outcome = if self.iterations > self.max_iterations() || self.out_of_time() {
            tracing::warn!(agent = %self.spec.name, iterations = self.iterations, "run budget exhausted");
            Outcome::Stopped(LIMIT_MESSAGE.to_string())
        } else {
            self.invoke(client.as_ref(), &model, &pending).await
        };

        for message in &pending {
            self.journal.write_message(message, None).await;
        }
        let reply = match outcome {
            Outcome::Answer {
                content,
                tool_calls,
            } => AgentMessage::Ai {
                content,
                tool_calls,
            },
            Outcome::Stopped(text) => AgentMessage::ai(text),
        };
        self.journal.write_message(&reply, None).await;

        let mut run = run;
        run.tool_calls = reply.tool_calls().to_vec();
        if run.tool_calls.is_empty() {
            run.status = RunStatus::Completed;
            self.state = RunState::ResponseReady;
        } else {
            run.status = RunStatus::RequiresAction;
            self.state = RunState::RequiresAction;
        }
        Ok(run)
    }

    async fn invoke(&self, client: &dyn LlmClient, model: &str, pending: &[AgentMessage]) -> Outcome {
        let mut history = self.history.lock().await.clone();
        history.extend(pending.iter().cloned());
        let (system, messages) = to_llm_messages(&history);

        let mut request = Request::new(model);
        request.system = system;
        request.messages = messages;
        request.tools = self.tools.clone();
        request.temperature = self.llm_config.temperature;
        if let Some(max_tokens) = self.llm_config.max_tokens {
            request.max_tokens = max_tokens;
        }

        self.log_exchange(
            "LLM request",
            &format!("{} messages, {} tools", request.messages.len(), request.tools.len()),
        );

        let policy = self.invocation.retry_policy;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.remaining_time() {
                Some(remaining) => tokio::time::timeout(remaining, client.create_message(&request))
                    .await
                    .unwrap_or_else(|_| Err(LlmError::Timeout(self.max_execution_seconds().unwrap_or_default()))),
                None => client.create_message(&request).await,
            };

            let error = match result {
                Ok(response) => {
                    self.log_exchange("LLM reply", &response.text());
                    return Outcome::Answer {
                        content: response.text(),
                        tool_calls: response.tool_calls(),
                    };
                }
                Err(error) => error,
            };

            match policy.decide(&error, attempt) {
                RetryDecision::Salvage(answer) => {
                    tracing::info!(agent = %self.spec.name, "salvaged answer from output parsing error");
                    return Outcome::Answer {
                        content: answer,
                        tool_calls: Vec::new(),
                    };
                }
                RetryDecision::Retry => {
                    tracing::warn!(
                        agent = %self.spec.name,
                        attempt,
                        error = %error,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
                RetryDecision::Fail => {
                    tracing::error!(agent = %self.spec.name, error = %error, "LLM call failed");
                    return Outcome::Stopped(exception_message(&error));
                }
            }
        }
    }

    /// Verbose agents log their LLM traffic at info, everyone else at debug.
    fn log_exchange(&self, event: &str, detail: &str) {
        if self.spec.verbose {
            tracing::info!(agent = %self.spec.name, origin = %DisplayOrigin(&self.origin), detail, "{event}");
        } else {
            tracing::debug!(agent = %self.spec.name, origin = %DisplayOrigin(&self.origin), detail, "{event}");
        }
    }

    /// Queue tool results for the next wait. Each output is the JSON list
    /// of messages the tool produced; its last message is the answer.
    pub fn submit_tool_outputs(&mut self, run: Run, tool_outputs: Vec<ToolOutput>) -> Run {
        if self.is_torn_down() {
            return run.cancelled();
        }
        self.pending = tool_outputs
            .into_iter()
            .map(|output| AgentMessage::AgentToolResult {
                content: extract_tool_answer(&output.output),
                tool_result_origin: output.origin,
                tool_call_id: Some(output.tool_call_id),
            })
            .collect();
        self.state = RunState::ToolCallsSubmitted;

        let mut run = run;
        run.status = RunStatus::Submitted;
        run.tool_calls.clear();
        run
    }

    /// Release the LLM and tool definitions. Further runs are cancelled.
    pub async fn delete_resources(&mut self) {
        self.llm = None;
        self.tools.clear();
        self.tool_names.clear();
        self.pending.clear();
        self.state = RunState::Deleted;
    }

    pub fn is_torn_down(&self) -> bool {
        self.state == RunState::Deleted || self.invocation.is_torn_down()
    }

    fn max_iterations(&self) -> u32 {
        self.spec.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    fn max_execution_seconds(&self) -> Option<u64> {
        self.spec.max_execution_seconds.filter(|s| *s > 0)
    }

    fn remaining_time(&self) -> Option<Duration> {
        let limit = Duration::from_secs(self.max_execution_seconds()?);
        let elapsed = self.turn_started.map(|t| t.elapsed()).unwrap_or_default();
        Some(limit.saturating_sub(elapsed))
    }

    fn out_of_time(&self) -> bool {
        self.remaining_time().is_some_and(|r| r.is_zero())
    }

    /// Map a name the model used back to the declared tool name.
    pub fn resolve_tool_name(&self, llm_name: &str) -> Option<&str> {
        self.tool_names.get(llm_name).map(String::as_str)
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    pub fn spec(&self) -> &Arc<AgentSpec> {
        &self.spec
    }

    pub fn sly_data(&self) -> &SlyData {
        &self.sly_data
    }

    pub fn invocation(&self) -> &Arc<InvocationContext> {
        &self.invocation
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    /// Snapshot of this instance's chat history.
    pub async fn history(&self) -> Vec<AgentMessage> {
        self.history.lock().await.clone()
    }

    /// The context children of this instance are created under.
    pub fn parent_context(&self) -> ParentContext {
        ParentContext {
            invocation: self.invocation.clone(),
            spec: Some(self.spec.clone()),
            origin: self.origin.clone(),
        }
    }
}

/// Provider-safe tool name: `[A-Za-z0-9_-]`, at most 64 characters.
fn llm_tool_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    let base = if trimmed.is_empty() { "tool" } else { trimmed };
    base.chars().take(MAX_TOOL_NAME_LEN).collect()
}

/// `base`, or `base` with the first free `_N` suffix when `taken` says the
/// plain name is in use. The result stays within the provider length cap.
fn unique_llm_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let suffix = format!("_{n}");
        let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len());
        let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Pull the authoritative answer out of a tool's JSON-encoded output.
///
/// The output may have been quoted more than once on its way through the
/// model's argument serialization; each layer of string encoding is peeled
/// off before the last message of the list is taken.
pub fn extract_tool_answer(output: &str) -> String {
    let mut value = match serde_json::from_str::<Value>(output) {
        Ok(value) => value,
        Err(_) => return output.to_string(),
    };
    while let Value::String(inner) = &value {
        match serde_json::from_str::<Value>(inner) {
            Ok(decoded) => value = decoded,
            Err(_) => return inner.clone(),
        }
    }

    let last = match value {
        Value::Array(mut items) => match items.pop() {
            Some(item) => item,
            None => return String::new(),
        },
        other => other,
    };
    unquote(&message_text(&last))
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("content")
            .or_else(|| map.get("text"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2
        && trimmed.starts_with('"')
        && trimmed.ends_with('"')
        && let Ok(Value::String(inner)) = serde_json::from_str::<Value>(trimmed)
    {
        return inner;
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLlmClient, invocation_for};
    use serde_json::json;
    use switchboard_core::{ChatContext, ChatMessageType, TextJournal};

    fn spec(value: Value) -> Arc<AgentSpec> {
        Arc::new(AgentSpec::from_value(value).unwrap())
    }

    fn front_spec() -> Value {
        json!({
            "name": "front",
            "instructions": "You answer questions.",
            "function": {"description": "Front door"},
            "tools": ["synonymizer"]
        })
    }

    fn synonymizer_spec() -> Value {
        json!({
            "name": "synonymizer",
            "instructions": "Find synonyms.",
            "function": {
                "description": "Finds synonyms",
                "parameters": {"type": "object", "properties": {"word": {"type": "string"}}}
            }
        })
    }

    fn front_origin() -> Origin {
        vec![OriginEntry::new("front", 0)]
    }

    #[tokio::test]
    async fn create_resources_defines_tools_and_prompt() {
        let client = ScriptedLlmClient::new();
        let invocation = invocation_for(vec![front_spec(), synonymizer_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());

        rc.create_resources("Be brief.", &["synonymizer".to_string()])
            .await
            .unwrap();

        assert_eq!(rc.state(), RunState::ResourcesCreated);
        assert_eq!(rc.tool_definitions()[0].name, "synonymizer");
        assert_eq!(rc.tool_definitions()[0].input_schema["properties"]["word"]["type"], "string");
        assert_eq!(rc.history().await, vec![AgentMessage::system("Be brief.")]);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_config_error() {
        let client = ScriptedLlmClient::new();
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());

        let err = rc
            .create_resources("x", &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("nope")));
    }

    #[tokio::test]
    async fn unreachable_external_tool_is_excluded() {
        let client = ScriptedLlmClient::new();
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());

        rc.create_resources("x", &["/missing_agent".to_string()])
            .await
            .unwrap();
        assert!(rc.tool_definitions().is_empty());
        let history = rc.history().await;
        assert_eq!(history.len(), 1, "framework notes are not replayable history");
    }

    #[tokio::test]
    async fn wait_on_run_journals_human_then_ai() {
        let client = ScriptedLlmClient::new();
        client.push_text("Hello there.");
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("Greet.", &[]).await.unwrap();

        let run = rc.submit_message("hi");
        assert_eq!(rc.history().await.len(), 1, "pending input is not history yet");

        let run = rc.wait_on_run(run).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(rc.state(), RunState::ResponseReady);
        assert_eq!(
            rc.history().await,
            vec![
                AgentMessage::system("Greet."),
                AgentMessage::human("hi"),
                AgentMessage::ai("Hello there."),
            ]
        );

        let request = client.requests().pop().unwrap();
        assert_eq!(request.system.as_deref(), Some("Greet."));
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn salvaged_output_becomes_the_answer_without_retry() {
        let client = ScriptedLlmClient::new();
        client.push_error(LlmError::OutputParsing(
            "An output parsing error occurred. Could not parse LLM output: `X`".to_string(),
        ));
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("Answer.", &[]).await.unwrap();

        let run = rc.submit_message("q");
        rc.wait_on_run(run).await.unwrap();

        assert_eq!(rc.history().await.last(), Some(&AgentMessage::ai("X")));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_exception() {
        let client = ScriptedLlmClient::new();
        for _ in 0..3 {
            client.push_error(LlmError::Transport("connection reset".to_string()));
        }
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("Answer.", &[]).await.unwrap();

        let run = rc.submit_message("q");
        let run = rc.wait_on_run(run).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(client.requests().len(), 3);
        assert_eq!(
            rc.history().await.last().map(AgentMessage::content),
            Some("Agent stopped due to exception HTTP request failed: connection reset")
        );
    }

    #[tokio::test]
    async fn tool_calls_require_action_and_outputs_are_unwrapped() {
        let client = ScriptedLlmClient::new();
        client.push_tool_call("synonymizer", json!({"word": "happy"}));
        client.push_text("glad");
        let invocation = invocation_for(vec![front_spec(), synonymizer_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("Answer.", &["synonymizer".to_string()])
            .await
            .unwrap();

        let run = rc.submit_message("synonyms for happy");
        let run = rc.wait_on_run(run).await.unwrap();
        assert!(run.requires_action());
        assert_eq!(rc.state(), RunState::RequiresAction);

        let call_id = run.tool_calls[0].id.clone();
        let output = json!([
            {"role": "system", "content": "Find synonyms."},
            {"role": "ai", "content": "joyful", "tool_calls": []}
        ])
        .to_string();
        let tool_origin = vec![OriginEntry::new("front", 0), OriginEntry::new("synonymizer", 0)];
        let run = rc.submit_tool_outputs(
            run,
            vec![ToolOutput {
                tool_call_id: call_id.clone(),
                origin: tool_origin.clone(),
                output,
            }],
        );
        assert_eq!(rc.state(), RunState::ToolCallsSubmitted);

        let run = rc.wait_on_run(run).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let history = rc.history().await;
        assert_eq!(
            history[3],
            AgentMessage::AgentToolResult {
                content: "joyful".to_string(),
                tool_result_origin: tool_origin,
                tool_call_id: Some(call_id),
            }
        );
        assert_eq!(history[4], AgentMessage::ai("glad"));
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_run() {
        let client = ScriptedLlmClient::new();
        let mut limited = front_spec();
        limited["max_iterations"] = json!(1);
        let invocation = invocation_for(vec![limited.clone()], &client, None);
        let mut rc = RunContext::new(invocation, spec(limited), front_origin(), SlyData::new());
        rc.create_resources("Answer.", &[]).await.unwrap();

        client.push_tool_call("anything", json!({}));
        let run = rc.submit_message("q");
        let run = rc.wait_on_run(run).await.unwrap();
        let run = rc.submit_tool_outputs(
            run,
            vec![ToolOutput {
                tool_call_id: "call_0".to_string(),
                origin: front_origin(),
                output: "\"done\"".to_string(),
            }],
        );
        let run = rc.wait_on_run(run).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(rc.history().await.last(), Some(&AgentMessage::ai(LIMIT_MESSAGE)));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn matching_chat_context_seeds_history() {
        let client = ScriptedLlmClient::new();
        let previous = vec![
            AgentMessage::system("Old instructions."),
            AgentMessage::human("first question"),
            AgentMessage::ai("first answer"),
        ];
        let context = ChatContext::from_history(&front_origin(), &previous);
        let invocation = invocation_for(vec![front_spec()], &client, Some(context));

        let rc = RunContext::new(invocation.clone(), spec(front_spec()), front_origin(), SlyData::new());
        assert_eq!(rc.history().await, previous);

        let mut rc = rc;
        rc.create_resources("New instructions.", &[]).await.unwrap();
        let history = rc.history().await;
        assert_eq!(history[0], AgentMessage::system("New instructions."));
        assert_eq!(history[2], AgentMessage::ai("first answer"));

        let other = vec![OriginEntry::new("front", 0), OriginEntry::new("synonymizer", 0)];
        let rc = RunContext::new(invocation, spec(synonymizer_spec()), other, SlyData::new());
        assert!(rc.history().await.is_empty());
    }

    #[tokio::test]
    async fn deleted_context_cancels_runs() {
        let client = ScriptedLlmClient::new();
        let invocation = invocation_for(vec![front_spec()], &client, None);
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("x", &[]).await.unwrap();

        let run = rc.submit_message("q");
        rc.delete_resources().await;
        let run = rc.wait_on_run(run).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn journal_sees_messages_with_origin() {
        let client = ScriptedLlmClient::new();
        client.push_text("hey");
        let text = Arc::new(TextJournal::new());
        let invocation = crate::testing::invocation_with_journal(
            vec![front_spec()],
            &client,
            None,
            text.clone(),
        );
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());
        rc.create_resources("x", &[]).await.unwrap();
        let run = rc.submit_message("yo");
        rc.wait_on_run(run).await.unwrap();

        let logs = text.get_logs().await;
        assert!(logs.contains(&format!("front: {:?}: hey", ChatMessageType::Ai)));
    }

    #[test]
    fn extract_handles_nested_quoting() {
        let inner = json!([{"role": "ai", "content": "\"quoted answer\""}]).to_string();
        let double = serde_json::to_string(&inner).unwrap();
        assert_eq!(extract_tool_answer(&double), "quoted answer");
        assert_eq!(extract_tool_answer("not json"), "not json");
        assert_eq!(extract_tool_answer("[]"), "");
        assert_eq!(extract_tool_answer("\"plain\""), "plain");
    }

    #[tokio::test]
    async fn colliding_tool_names_get_distinct_llm_names() {
        let client = ScriptedLlmClient::new();
        let helper = |name: &str| json!({"name": name, "instructions": "Add.", "function": {"description": name}});
        let invocation = invocation_for(
            vec![front_spec(), helper("math_guy"), helper("math guy")],
            &client,
            None,
        );
        let mut rc = RunContext::new(invocation, spec(front_spec()), front_origin(), SlyData::new());

        let tools = ["math_guy".to_string(), "math guy".to_string(), "math_guy".to_string()];
        rc.create_resources("x", &tools).await.unwrap();

        let names: Vec<&str> = rc.tool_definitions().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["math_guy", "math_guy_2"]);
        assert_eq!(rc.resolve_tool_name("math_guy"), Some("math_guy"));
        assert_eq!(rc.resolve_tool_name("math_guy_2"), Some("math guy"));
    }

    #[test]
    fn suffixed_names_stay_within_the_length_cap() {
        let base = "a".repeat(MAX_TOOL_NAME_LEN);
        let unique = unique_llm_name(&base, |candidate| candidate == base);
        assert_eq!(unique.len(), MAX_TOOL_NAME_LEN);
        assert!(unique.ends_with("_2"));
    }

    #[test]
    fn llm_tool_names_are_sanitized() {
        assert_eq!(llm_tool_name("/math_guy"), "math_guy");
        assert_eq!(llm_tool_name("http://host:80/agent"), "http___host_80_agent");
        assert_eq!(llm_tool_name("///"), "tool");
    }
}
