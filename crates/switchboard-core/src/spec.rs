// ABOUTME: Declarative agent spec model as loaded from an agent network file.
// ABOUTME: Keeps the raw mapping for policy lookups alongside typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur while validating an agent spec.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("agent spec must be a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("agent spec has neither a name nor a function.name")]
    MissingName,

    #[error("agent spec '{name}' is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The function signature an agent exposes to a calling LLM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// JSON-schema object describing the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl FunctionSpec {
    /// True when the function declares a non-null parameters schema.
    pub fn has_parameters(&self) -> bool {
        matches!(&self.parameters, Some(p) if !p.is_null())
    }

    /// The `properties` map of the parameters schema, if any.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("properties"))
            .and_then(Value::as_object)
    }

    /// Names listed under the schema's `required` array.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("required"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// LLM selection and tuning for an agent. Unknown keys are preserved so
/// provider-specific settings survive merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LlmConfig {
    /// Overlay `self` on top of `base`; keys set in `self` win.
    pub fn merged_over(&self, base: &LlmConfig) -> LlmConfig {
        let mut extra = base.extra.clone();
        for (k, v) in &self.extra {
            extra.insert(k.clone(), v.clone());
        }
        LlmConfig {
            provider: self.provider.clone().or_else(|| base.provider.clone()),
            model_name: self.model_name.clone().or_else(|| base.model_name.clone()),
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            extra,
        }
    }
}

/// Wire shape of an agent spec before name resolution.
#[derive(Debug, Deserialize)]
struct RawAgentSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    function: Option<FunctionSpec>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    llm_config: Option<LlmConfig>,
    #[serde(default)]
    max_execution_seconds: Option<u64>,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default)]
    verbose: bool,
}

/// How an agent spec is realized as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecShape<'a> {
    /// Backed by a registered coded tool.
    Class(&'a str),
    /// Backed by a legacy synchronous coded method.
    Method(&'a str),
    /// LLM-driven agent that is called by another agent.
    Branch,
    /// LLM-driven root of a conversation.
    FrontMan,
}

/// An immutable agent spec. Shared by every tool instance built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub instructions: Option<String>,
    pub command: Option<String>,
    pub function: Option<FunctionSpec>,
    pub class: Option<String>,
    pub method: Option<String>,
    pub tools: Vec<String>,
    pub args: Map<String, Value>,
    pub llm_config: Option<LlmConfig>,
    pub max_execution_seconds: Option<u64>,
    pub max_iterations: Option<u32>,
    pub verbose: bool,
    raw: Value,
}

impl AgentSpec {
    /// Validate a raw mapping into a spec. The resolved name is the
    /// function's name when present, else the `name` field.
    pub fn from_value(value: Value) -> Result<Self, SpecError> {
        if !value.is_object() {
            return Err(SpecError::NotAMapping(value_kind(&value)));
        }

        let fallback_name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();
        let raw: RawAgentSpec =
            serde_json::from_value(value.clone()).map_err(|source| SpecError::Malformed {
                name: fallback_name,
                source,
            })?;

        let name = raw
            .function
            .as_ref()
            .and_then(|f| f.name.clone())
            .filter(|n| !n.is_empty())
            .or(raw.name.filter(|n| !n.is_empty()))
            .ok_or(SpecError::MissingName)?;

        Ok(Self {
            name,
            instructions: raw.instructions,
            command: raw.command,
            function: raw.function,
            class: raw.class,
            method: raw.method,
            tools: raw.tools,
            args: raw.args,
            llm_config: raw.llm_config,
            max_execution_seconds: raw.max_execution_seconds,
            max_iterations: raw.max_iterations,
            verbose: raw.verbose,
            raw: value,
        })
    }

    /// The original mapping this spec was built from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Look up a dotted key such as `allow.sly_data` in the raw mapping.
    pub fn get_path(&self, dotted_key: &str) -> Option<&Value> {
        lookup_dotted(&self.raw, dotted_key)
    }

    pub fn shape(&self) -> SpecShape<'_> {
        if let Some(class) = self.class.as_deref() {
            SpecShape::Class(class)
        } else if let Some(method) = self.method.as_deref() {
            SpecShape::Method(method)
        } else if self.function.is_some() {
            SpecShape::Branch
        } else {
            SpecShape::FrontMan
        }
    }

    /// Whether this agent's downstream tools may be reported by connectivity
    /// queries. Only an explicit `false` hides them.
    pub fn allows_connectivity(&self) -> bool {
        !matches!(self.get_path("allow.connectivity"), Some(Value::Bool(false)))
    }
}

/// Walk a dotted key path through nested mappings.
pub fn lookup_dotted<'a>(value: &'a Value, dotted_key: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in dotted_key.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
