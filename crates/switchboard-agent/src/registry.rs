// ABOUTME: Read-only collection of the agent specs of one network, keyed by name.
// ABOUTME: Locates the front man and builds the right tool variant for each call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use switchboard_core::{
    AgentSpec, DisplayOrigin, Journal, OriginatingJournal, SlyData, SlyDataRedactor, SpecShape,
};
use switchboard_store::AgentNetwork;

use crate::coded_tool::{BranchContext, CodedToolCtor};
use crate::error::AgentError;
use crate::invocation::ParentContext;
use crate::session::ExternalAgentRef;
use crate::tools::{AgentTool, BranchTool, ClassTool, ExternalTool, FrontMan, MethodTool};

/// The agent specs of one network. Immutable once built and shared by
/// every conversation on that network.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    name: String,
    specs: HashMap<String, Arc<AgentSpec>>,
    order: Vec<String>,
    agent_tool_path: String,
}

impl ToolRegistry {
    pub fn new(name: impl Into<String>, agent_tool_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: HashMap::new(),
            order: Vec::new(),
            agent_tool_path: agent_tool_path.into(),
        }
    }

    pub fn from_network(network: &AgentNetwork, agent_tool_path: impl Into<String>) -> Self {
        let mut registry = Self::new(network.name.clone(), agent_tool_path);
        for spec in &network.specs {
            registry.register(spec.clone());
        }
        registry
    }

    /// Add a spec. A later spec with the same name replaces the earlier one.
    pub fn register(&mut self, spec: AgentSpec) {
        let name = spec.name.clone();
        if self.specs.insert(name.clone(), Arc::new(spec)).is_some() {
            tracing::warn!(network = %self.name, agent = %name, "duplicate agent name; keeping the last definition");
        } else {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentSpec>> {
        self.specs.get(name).cloned()
    }

    /// Agent names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn network_name(&self) -> &str {
        &self.name
    }

    pub fn agent_tool_path(&self) -> &str {
        &self.agent_tool_path
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The single agent whose function takes no parameters. With no such
    /// agent the first registered spec is used; several are ambiguous.
    pub fn find_front_man(&self) -> Result<Arc<AgentSpec>, AgentError> {
        let candidates: Vec<&String> = self
            .order
            .iter()
            .filter(|name| {
                self.specs
                    .get(name.as_str())
                    .and_then(|spec| spec.function.as_ref())
                    .map(|function| !function.has_parameters())
                    .unwrap_or(false)
            })
            .collect();

        match candidates.as_slice() {
            [one] => self.get(one.as_str()).ok_or_else(|| missing(one.as_str())),
            [] => self
                .order
                .first()
                .and_then(|name| self.get(name))
                .ok_or_else(|| {
                    AgentError::Config(format!("network '{}' has no agents", self.name))
                }),
            many => Err(AgentError::Config(format!(
                "network '{}' has {} candidate front men: {}",
                self.name,
                many.len(),
                many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Build a tool instance for one call of `name` made by `parent`.
    ///
    /// In-network tools share the caller's sly data. External tools get a
    /// copy redacted against the caller's spec.
    pub async fn create_agent_tool(
        &self,
        parent: &ParentContext,
        journal: Arc<dyn Journal>,
        name: &str,
        sly_data: SlyData,
        arguments: Map<String, Value>,
    ) -> Result<AgentTool, AgentError> {
        let invocation = &parent.invocation;
        let origin = invocation
            .origination
            .add_spec_name_to_origin(&parent.origin, name)
            .await?;

        if let Some(spec) = self.get(name) {
            let arguments = merge_arguments(arguments, &spec.args);
            let tool_journal: Arc<dyn Journal> =
                Arc::new(OriginatingJournal::new(journal, origin.clone(), None));
            tracing::debug!(tool = %name, origin = %DisplayOrigin(&origin), "creating agent tool");

            let tool = match spec.shape() {
                SpecShape::Class(class) => {
                    let ctor =
                        invocation
                            .coded_tools
                            .resolve_class(&self.agent_tool_path, &self.name, class);
                    let instance = ctor.map(|ctor| match ctor {
                        CodedToolCtor::Plain(make) => make(),
                        CodedToolCtor::Branch(make) => make(BranchContext::new(
                            ParentContext {
                                invocation: invocation.clone(),
                                spec: Some(spec.clone()),
                                origin: origin.clone(),
                            },
                            sly_data.clone(),
                        )),
                    });
                    AgentTool::Class(ClassTool::new(
                        name, class, instance, arguments, sly_data, origin, tool_journal,
                    ))
                }
                SpecShape::Method(method) => {
                    let function =
                        invocation
                            .coded_tools
                            .resolve_method(&self.agent_tool_path, &self.name, method);
                    AgentTool::Method(MethodTool::new(
                        name, method, function, arguments, sly_data, origin, tool_journal,
                    ))
                }
                SpecShape::Branch => AgentTool::Branch(BranchTool::new(
                    invocation.clone(),
                    spec.clone(),
                    origin,
                    arguments,
                    sly_data,
                )),
                SpecShape::FrontMan => AgentTool::FrontMan(FrontMan::new(
                    invocation.clone(),
                    spec.clone(),
                    origin,
                    sly_data,
                    arguments,
                )),
            };
            return Ok(tool);
        }

        if let Some(reference) = ExternalAgentRef::parse(name) {
            let snapshot = sly_data.snapshot().await;
            let outbound = SlyDataRedactor::default().filter_spec(parent.spec.as_deref(), &snapshot);
            let tool_journal: Arc<dyn Journal> =
                Arc::new(OriginatingJournal::new(journal, origin.clone(), None));
            return Ok(AgentTool::External(ExternalTool::new(
                name,
                reference,
                origin,
                arguments,
                outbound,
                sly_data,
                parent.spec.clone(),
                invocation.session_factory.clone(),
                tool_journal,
            )));
        }

        Err(AgentError::Config(format!(
            "network '{}' has no tool named '{name}'",
            self.name
        )))
    }
}

fn missing(name: &str) -> AgentError {
    AgentError::Config(format!("agent '{name}' vanished from registry"))
}

/// Fixed arguments from the spec win over whatever the model supplied.
fn merge_arguments(mut arguments: Map<String, Value>, fixed: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in fixed {
        arguments.insert(key.clone(), value.clone());
    }
    arguments
}
