// ABOUTME: Plugin registry for coded tools referenced by `class` and `method` in agent specs.
// ABOUTME: Maps string identifiers to constructors populated at startup instead of dynamic loading.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchboard_core::{AgentMessage, AgentSpec, OriginEntry, SlyData, SlyMap};

use crate::error::AgentError;
use crate::invocation::ParentContext;

/// Contract every coded tool satisfies. Errors are reported back to the
/// calling agent as text, never as framework failures.
#[async_trait]
pub trait CodedTool: Send + Sync {
    async fn invoke(&self, args: &Map<String, Value>, sly_data: &SlyData) -> anyhow::Result<Value>;
}

/// Legacy synchronous tool entry point.
pub type MethodFn = fn(&Map<String, Value>, &mut SlyMap) -> anyhow::Result<Value>;

/// How a registered coded tool is constructed.
#[derive(Clone, Copy)]
pub enum CodedToolCtor {
    /// No-args constructor.
    Plain(fn() -> Arc<dyn CodedTool>),
    /// Constructor for tools that call further tools of their own agent.
    Branch(fn(BranchContext) -> Arc<dyn CodedTool>),
}

/// Registry of coded tools, keyed by dotted identifiers.
#[derive(Default, Clone)]
pub struct CodedToolRegistry {
    classes: HashMap<String, CodedToolCtor>,
    methods: HashMap<String, MethodFn>,
}

impl CodedToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, ctor: CodedToolCtor) -> &mut Self {
        self.classes.insert(id.into(), ctor);
        self
    }

    pub fn register_method(&mut self, id: impl Into<String>, method: MethodFn) -> &mut Self {
        self.methods.insert(id.into(), method);
        self
    }

    /// Resolve a `class` reference, trying `{tool_path}.{network}.{class}`,
    /// then `{network}.{class}`, then the bare reference.
    pub fn resolve_class(&self, tool_path: &str, network: &str, class: &str) -> Option<CodedToolCtor> {
        candidates(tool_path, network, class)
            .into_iter()
            .find_map(|id| self.classes.get(&id).copied())
    }

    /// Resolve a legacy `method` reference with the same search order.
    pub fn resolve_method(&self, tool_path: &str, network: &str, method: &str) -> Option<MethodFn> {
        candidates(tool_path, network, method)
            .into_iter()
            .find_map(|id| self.methods.get(&id).copied())
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn candidates(tool_path: &str, network: &str, reference: &str) -> Vec<String> {
    let mut ids = Vec::with_capacity(3);
    if !tool_path.is_empty() && !network.is_empty() {
        ids.push(format!("{tool_path}.{network}.{reference}"));
    }
    if !network.is_empty() {
        ids.push(format!("{network}.{reference}"));
    }
    ids.push(reference.to_string());
    ids
}

/// Call-graph access handed to branch-capable coded tools.
#[derive(Clone)]
pub struct BranchContext {
    parent: ParentContext,
    sly_data: SlyData,
}

impl BranchContext {
    pub(crate) fn new(parent: ParentContext, sly_data: SlyData) -> Self {
        Self { parent, sly_data }
    }

    pub fn spec(&self) -> Option<&AgentSpec> {
        self.parent.spec.as_deref()
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.parent.origin
    }

    pub fn sly_data(&self) -> &SlyData {
        &self.sly_data
    }

    /// Invoke one of this agent's declared tools and return its answer.
    pub async fn use_tool(&self, name: &str, args: Map<String, Value>) -> Result<String, AgentError> {
        let declared = self
            .spec()
            .map(|spec| spec.tools.iter().any(|t| t == name))
            .unwrap_or(false);
        if !declared {
            return Err(AgentError::Config(format!(
                "tool '{name}' is not declared by the calling agent"
            )));
        }

        let invocation = &self.parent.invocation;
        let mut tool = invocation
            .registry
            .create_agent_tool(
                &self.parent,
                invocation.journal.clone(),
                name,
                self.sly_data.clone(),
                args,
            )
            .await?;
        let result = tool.build().await;
        tool.delete_resources().await;

        Ok(result?
            .last()
            .map(AgentMessage::content)
            .unwrap_or_default()
            .to_string())
    }
}
