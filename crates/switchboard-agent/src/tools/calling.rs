// ABOUTME: The tool-call loop shared by every LLM-driven tool.
// ABOUTME: Invokes requested child tools one at a time and feeds their outputs back to the run.

use serde_json::Map;
use switchboard_core::DisplayOrigin;

use crate::error::AgentError;
use crate::run_context::{Run, RunContext, ToolOutput};

/// Wait on `run` and keep servicing tool calls until the model answers or
/// the context is torn down. The run context's iteration budget bounds
/// the number of rounds.
pub async fn drive_run(run_context: &mut RunContext, run: Run) -> Result<Run, AgentError> {
    let mut run = run_context.wait_on_run(run).await?;
    while run.requires_action() {
        let outputs = make_tool_function_calls(run_context, &run).await?;
        let submitted = run_context.submit_tool_outputs(run, outputs);
        run = run_context.wait_on_run(submitted).await?;
    }
    Ok(run)
}

/// Invoke every tool call of `run` in order. Calls to names the agent did
/// not declare, and calls that would nest past the invocation's call
/// limits, are answered with an error string for the model to see.
pub async fn make_tool_function_calls(
    run_context: &RunContext,
    run: &Run,
) -> Result<Vec<ToolOutput>, AgentError> {
    let parent = run_context.parent_context();
    let invocation = run_context.invocation();
    let mut outputs = Vec::with_capacity(run.tool_calls.len());

    for call in &run.tool_calls {
        if run_context.is_torn_down() {
            break;
        }

        let Some(name) = run_context.resolve_tool_name(&call.name) else {
            tracing::warn!(tool = %call.name, "model called an undeclared tool");
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                origin: run_context.origin().to_vec(),
                output: serde_json::to_string(&format!(
                    "Error: tool '{}' is not available",
                    call.name
                ))?,
            });
            continue;
        };

        if let Some(reason) = invocation.call_limits.check(run_context.origin(), name) {
            tracing::warn!(
                tool = %name,
                origin = %DisplayOrigin(run_context.origin()),
                %reason,
                "refusing tool call"
            );
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                origin: run_context.origin().to_vec(),
                output: serde_json::to_string(&format!(
                    "Error: tool '{name}' was not called: {reason}"
                ))?,
            });
            continue;
        }

        let arguments = call.arguments.as_object().cloned().unwrap_or_else(Map::new);
        let mut tool = invocation
            .registry
            .create_agent_tool(
                &parent,
                invocation.journal.clone(),
                name,
                run_context.sly_data().clone(),
                arguments,
            )
            .await?;
        tracing::debug!(tool = %name, origin = %DisplayOrigin(tool.origin()), "calling tool");

        let messages = tool.build().await;
        tool.delete_resources().await;
        let messages = messages?;

        outputs.push(ToolOutput {
            tool_call_id: call.id.clone(),
            origin: tool.origin().to_vec(),
            output: serde_json::to_string(&messages)?,
        });
    }
    Ok(outputs)
}
