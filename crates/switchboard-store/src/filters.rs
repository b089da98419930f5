// ABOUTME: Normalization filter chain applied to a network document before registration.
// ABOUTME: Substitutes replacement strings, merges network llm_config, then validates specs.

use serde_json::{Map, Value};
use switchboard_core::AgentSpec;

use crate::StoreError;

/// One step of network normalization, operating on the whole document.
pub trait NetworkFilter {
    fn apply(&self, document: Value) -> Result<Value, StoreError>;
}

/// Replaces `{key}` inside every string of the `tools` list with the value
/// declared under `commondefs.replacement_strings`.
#[derive(Debug, Default)]
pub struct ReplacementStringsFilter;

impl NetworkFilter for ReplacementStringsFilter {
    fn apply(&self, mut document: Value) -> Result<Value, StoreError> {
        let replacements: Vec<(String, String)> = document
            .pointer("/commondefs/replacement_strings")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (format!("{{{k}}}"), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        if replacements.is_empty() {
            return Ok(document);
        }
        if let Some(tools) = document.get_mut("tools") {
            replace_in_strings(tools, &replacements);
        }
        Ok(document)
    }
}

fn replace_in_strings(value: &mut Value, replacements: &[(String, String)]) {
    match value {
        Value::String(s) => {
            for (pattern, replacement) in replacements {
                if s.contains(pattern.as_str()) {
                    *s = s.replace(pattern.as_str(), replacement);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                replace_in_strings(item, replacements);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                replace_in_strings(item, replacements);
            }
        }
        _ => {}
    }
}

/// Merges the network-level `llm_config` under each spec's own
/// `llm_config`; keys the spec sets win.
#[derive(Debug, Default)]
pub struct LlmConfigFilter;

impl NetworkFilter for LlmConfigFilter {
    fn apply(&self, mut document: Value) -> Result<Value, StoreError> {
        let Some(base) = document.get("llm_config").and_then(Value::as_object).cloned() else {
            return Ok(document);
        };

        if let Some(tools) = document.get_mut("tools").and_then(Value::as_array_mut) {
            for tool in tools.iter_mut().filter_map(Value::as_object_mut) {
                let mut merged: Map<String, Value> = base.clone();
                if let Some(Value::Object(own)) = tool.get("llm_config") {
                    for (k, v) in own {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                tool.insert("llm_config".to_string(), Value::Object(merged));
            }
        }
        Ok(document)
    }
}

/// Run the standard filter chain and validate every entry of `tools`.
pub fn normalize_network(network: &str, document: Value) -> Result<Vec<AgentSpec>, StoreError> {
    if !document.is_object() {
        return Err(StoreError::NotAMapping("agent network"));
    }

    let filters: [&dyn NetworkFilter; 2] = [&ReplacementStringsFilter, &LlmConfigFilter];
    let mut document = document;
    for filter in filters {
        document = filter.apply(document)?;
    }

    let tools = match document.get_mut("tools").map(Value::take) {
        Some(Value::Array(tools)) => tools,
        Some(_) => return Err(StoreError::NotAMapping("agent network tools list")),
        None => Vec::new(),
    };

    tools
        .into_iter()
        .map(|tool| {
            AgentSpec::from_value(tool).map_err(|source| StoreError::Spec {
                network: network.to_string(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replacement_strings_fill_tool_text() {
        let doc = json!({
            "commondefs": {"replacement_strings": {"persona": "a pirate"}},
            "tools": [{"name": "front", "instructions": "You are {persona}. Keep {other}."}]
        });
        let specs = normalize_network("net", doc).unwrap();
        assert_eq!(
            specs[0].instructions.as_deref(),
            Some("You are a pirate. Keep {other}.")
        );
    }

    #[test]
    fn network_llm_config_merges_under_spec() {
        let doc = json!({
            "llm_config": {"model_name": "base-model", "temperature": 0.2},
            "tools": [
                {"name": "a", "llm_config": {"model_name": "own-model"}},
                {"name": "b"}
            ]
        });
        let specs = normalize_network("net", doc).unwrap();

        let a = specs[0].llm_config.as_ref().unwrap();
        assert_eq!(a.model_name.as_deref(), Some("own-model"));
        assert_eq!(a.temperature, Some(0.2));

        let b = specs[1].llm_config.as_ref().unwrap();
        assert_eq!(b.model_name.as_deref(), Some("base-model"));
    }

    #[test]
    fn unnamed_spec_is_rejected() {
        let doc = json!({"tools": [{"instructions": "nameless"}]});
        let err = normalize_network("net", doc).unwrap_err();
        assert!(matches!(err, StoreError::Spec { ref network, .. } if network == "net"));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        assert!(matches!(
            normalize_network("net", json!([1, 2])),
            Err(StoreError::NotAMapping(_))
        ));
    }

    #[test]
    fn missing_tools_yields_empty_network() {
        assert!(normalize_network("net", json!({})).unwrap().is_empty());
    }
}
