// ABOUTME: The root agent of a conversation: takes user input and runs the tool-call loop.
// ABOUTME: Exits quietly if its conversation is torn down mid-turn.

use std::sync::Arc;

use serde_json::{Map, Value};
use switchboard_core::{AgentMessage, AgentSpec, Origin, OriginEntry, SlyData};

use crate::error::AgentError;
use crate::invocation::InvocationContext;
use crate::run_context::{RunContext, RunStatus};
use crate::tools::branch::build_instructions;
use crate::tools::calling::drive_run;

pub struct FrontMan {
    invocation: Arc<InvocationContext>,
    spec: Arc<AgentSpec>,
    origin: Origin,
    sly_data: SlyData,
    arguments: Map<String, Value>,
    run_context: Option<RunContext>,
}

impl FrontMan {
    pub fn new(
        invocation: Arc<InvocationContext>,
        spec: Arc<AgentSpec>,
        origin: Origin,
        sly_data: SlyData,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            invocation,
            spec,
            origin,
            sly_data,
            arguments,
            run_context: None,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    pub fn spec(&self) -> &Arc<AgentSpec> {
        &self.spec
    }

    /// Create the run context on first use.
    pub async fn create_resources(&mut self) -> Result<(), AgentError> {
        if self.run_context.is_some() {
            return Ok(());
        }
        let instructions = build_instructions(&self.spec, &self.arguments)?;
        let mut run_context = RunContext::new(
            self.invocation.clone(),
            self.spec.clone(),
            self.origin.clone(),
            self.sly_data.clone(),
        );
        run_context
            .create_resources(&instructions, &self.spec.tools)
            .await?;
        self.run_context = Some(run_context);
        Ok(())
    }

    /// Drive one user turn to completion and return the front man's history.
    pub async fn submit_message(&mut self, user_input: &str) -> Result<Vec<AgentMessage>, AgentError> {
        self.create_resources().await?;
        let Some(run_context) = self.run_context.as_mut() else {
            return Ok(Vec::new());
        };

        let run = run_context.submit_message(user_input);
        let run = drive_run(run_context, run).await?;
        if run.status == RunStatus::Cancelled {
            tracing::debug!(agent = %self.spec.name, "front man torn down mid-turn");
        }
        Ok(run_context.history().await)
    }

    /// Entry point when a front-man-shaped spec is used as a tool.
    pub async fn build(&mut self) -> Result<Vec<AgentMessage>, AgentError> {
        let input = match &self.spec.command {
            Some(command) => command.clone(),
            None => serde_json::to_string(&self.arguments)?,
        };
        self.submit_message(&input).await
    }

    pub async fn delete_resources(&mut self) {
        if let Some(mut run_context) = self.run_context.take() {
            run_context.delete_resources().await;
        }
    }
}
