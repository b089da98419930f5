// ABOUTME: Builtin coded tools registered by the binary at startup.
// ABOUTME: The accountant keeps a running cost of agent calls in the conversation's sly data.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use switchboard_agent::{CodedTool, CodedToolCtor, CodedToolRegistry};
use switchboard_core::SlyData;

/// Sly-data key the accountant maintains.
pub const RUNNING_COST_KEY: &str = "running_cost";

/// Cost added per accounted call.
const CALL_COST: f64 = 3.0;

/// Adds a fixed cost to `running_cost` each time it is called and reports
/// the new total.
pub struct Accountant;

#[async_trait]
impl CodedTool for Accountant {
    async fn invoke(&self, _args: &Map<String, Value>, sly_data: &SlyData) -> anyhow::Result<Value> {
        let previous = match sly_data.get(RUNNING_COST_KEY).await {
            None => 0.0,
            Some(value) => value
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("{RUNNING_COST_KEY} is not a number: {value}"))?,
        };
        let total = previous + CALL_COST;
        sly_data.insert(RUNNING_COST_KEY, json!(total)).await;
        tracing::debug!(running_cost = total, "accounted for call");
        Ok(json!({ RUNNING_COST_KEY: total }))
    }
}

fn accountant() -> Arc<dyn CodedTool> {
    Arc::new(Accountant)
}

/// Registry holding every builtin coded tool.
pub fn builtin_coded_tools() -> CodedToolRegistry {
    let mut registry = CodedToolRegistry::new();
    registry.register("accounting.Accountant", CodedToolCtor::Plain(accountant));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accountant_accumulates_in_sly_data() {
        let sly_data = SlyData::new();
        let tool = Accountant;

        tool.invoke(&Map::new(), &sly_data).await.unwrap();
        let result = tool.invoke(&Map::new(), &sly_data).await.unwrap();

        assert_eq!(result["running_cost"], 6.0);
        assert_eq!(sly_data.get(RUNNING_COST_KEY).await, Some(json!(6.0)));
    }

    #[tokio::test]
    async fn accountant_rejects_non_numeric_cost() {
        let sly_data = SlyData::new();
        sly_data.insert(RUNNING_COST_KEY, json!("lots")).await;
        assert!(Accountant.invoke(&Map::new(), &sly_data).await.is_err());
    }

    #[test]
    fn accountant_resolves_from_any_network() {
        let registry = builtin_coded_tools();
        assert!(registry.resolve_class("coded_tools", "hello", "accounting.Accountant").is_some());
        assert!(registry.resolve_class("coded_tools", "hello", "Accountant").is_none());
    }
}
