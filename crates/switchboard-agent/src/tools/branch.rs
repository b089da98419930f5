// ABOUTME: LLM-driven tool that is called by another agent and may call tools of its own.
// ABOUTME: Synthesizes per-call instructions from declared parameters and supplied arguments.

use std::sync::Arc;

use serde_json::{Map, Value};
use switchboard_core::prompt::{escape_braces, render_template};
use switchboard_core::{AgentMessage, AgentSpec, Origin, OriginEntry, SlyData};

use crate::error::AgentError;
use crate::invocation::InvocationContext;
use crate::run_context::RunContext;
use crate::tools::calling::drive_run;

/// Human turn used when a spec declares no `command`.
pub const DEFAULT_COMMAND: &str = "Perform the function described in your instructions using the specifics provided.";

/// Combine an agent's instructions with the specifics of this call.
///
/// Each declared parameter that received a value adds a line to a
/// specifics block. Values are escaped so their braces survive template
/// rendering; the agent's own instructions may use `{argument}`
/// placeholders. An LLM-driven agent without instructions is a
/// configuration error.
pub fn build_instructions(
    spec: &AgentSpec,
    arguments: &Map<String, Value>,
) -> Result<String, AgentError> {
    let base = match spec.instructions.as_deref() {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(AgentError::Config(format!(
                "agent '{}' has no instructions",
                spec.name
            )));
        }
    };

    let specifics: Vec<String> = spec
        .function
        .as_ref()
        .and_then(|f| f.properties())
        .map(|properties| {
            properties
                .keys()
                .filter_map(|name| {
                    let value = arguments.get(name)?;
                    Some(format!("The {name} is {}.", escape_braces(&render_value(value))))
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(function) = &spec.function {
        for name in function.required() {
            if !arguments.contains_key(name) {
                tracing::warn!(agent = %spec.name, parameter = name, "required argument missing");
            }
        }
    }

    let template = if specifics.is_empty() {
        base.to_string()
    } else {
        format!(
            "{base}\n\nHere are the specifics for this request:\n{}",
            specifics.join("\n")
        )
    };
    Ok(render_template(&template, arguments))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// An agent invoked as a tool.
pub struct BranchTool {
    invocation: Arc<InvocationContext>,
    spec: Arc<AgentSpec>,
    origin: Origin,
    arguments: Map<String, Value>,
    sly_data: SlyData,
    run_context: Option<RunContext>,
}

impl BranchTool {
    pub fn new(
        invocation: Arc<InvocationContext>,
        spec: Arc<AgentSpec>,
        origin: Origin,
        arguments: Map<String, Value>,
        sly_data: SlyData,
    ) -> Self {
        Self {
            invocation,
            spec,
            origin,
            arguments,
            sly_data,
            run_context: None,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    /// Run one turn and return this agent's history.
    pub async fn build(&mut self) -> Result<Vec<AgentMessage>, AgentError> {
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

        let command = self.spec.command.as_deref().unwrap_or(DEFAULT_COMMAND);
        let run = run_context.submit_message(command);
        let result = drive_run(&mut run_context, run).await;
        let history = run_context.history().await;
        self.run_context = Some(run_context);

        result?;
        Ok(history)
    }

    pub async fn delete_resources(&mut self) {
        if let Some(mut run_context) = self.run_context.take() {
            run_context.delete_resources().await;
        }
    }
}
