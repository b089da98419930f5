// ABOUTME: Tools backed by registered coded tools: async class tools and legacy sync methods.
// ABOUTME: Failures become an error-string answer so the calling model can react.

use std::sync::Arc;

use serde_json::{Map, Value};
use switchboard_core::{AgentMessage, Journal, Origin, OriginEntry, SlyData};

use crate::coded_tool::{CodedTool, MethodFn};
use crate::error::AgentError;

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Wraps a coded tool instance.
pub struct ClassTool {
    name: String,
    reference: String,
    tool: Option<Arc<dyn CodedTool>>,
    arguments: Map<String, Value>,
    sly_data: SlyData,
    origin: Origin,
    journal: Arc<dyn Journal>,
}

impl ClassTool {
    /// `tool` is `None` when the reference did not resolve; building then
    /// reports the problem as the tool's answer.
    pub fn new(
        name: impl Into<String>,
        reference: impl Into<String>,
        tool: Option<Arc<dyn CodedTool>>,
        arguments: Map<String, Value>,
        sly_data: SlyData,
        origin: Origin,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
            tool,
            arguments,
            sly_data,
            origin,
            journal,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    pub async fn build(&mut self) -> Result<Vec<AgentMessage>, AgentError> {
        let text = match &self.tool {
            None => format!(
                "Error: coded tool '{}' for agent '{}' is not registered",
                self.reference, self.name
            ),
            Some(tool) => match tool.invoke(&self.arguments, &self.sly_data).await {
                Ok(value) => value_text(value),
                Err(err) => {
                    tracing::warn!(tool = %self.name, error = %err, "coded tool failed");
                    format!("Error: {err:#}")
                }
            },
        };
        let message = AgentMessage::ai(text);
        self.journal.write_message(&message, None).await;
        Ok(vec![message])
    }
}

/// Wraps a legacy synchronous method.
pub struct MethodTool {
    name: String,
    reference: String,
    method: Option<MethodFn>,
    arguments: Map<String, Value>,
    sly_data: SlyData,
    origin: Origin,
    journal: Arc<dyn Journal>,
}

impl MethodTool {
    pub fn new(
        name: impl Into<String>,
        reference: impl Into<String>,
        method: Option<MethodFn>,
        arguments: Map<String, Value>,
        sly_data: SlyData,
        origin: Origin,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
            method,
            arguments,
            sly_data,
            origin,
            journal,
        }
    }

    pub fn origin(&self) -> &[OriginEntry] {
        &self.origin
    }

    pub async fn build(&mut self) -> Result<Vec<AgentMessage>, AgentError> {
        let text = match self.method {
            None => format!(
                "Error: method '{}' for agent '{}' is not registered",
                self.reference, self.name
            ),
            Some(method) => {
                let mut sly = self.sly_data.snapshot().await;
                let result = method(&self.arguments, &mut sly);
                self.sly_data.update(sly).await;
                match result {
                    Ok(value) => value_text(value),
                    Err(err) => format!("Error: {err:#}"),
                }
            }
        };
        let message = AgentMessage::ai(text);
        self.journal.write_message(&message, None).await;
        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use switchboard_core::{SlyMap, TextJournal};

    struct Fails;

    #[async_trait]
    impl CodedTool for Fails {
        async fn invoke(&self, _args: &Map<String, Value>, _sly: &SlyData) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    struct Counter;

    #[async_trait]
    impl CodedTool for Counter {
        async fn invoke(&self, args: &Map<String, Value>, sly: &SlyData) -> anyhow::Result<Value> {
            let n = args.get("n").and_then(Value::as_i64).unwrap_or(1);
            sly.insert("count", json!(n)).await;
            Ok(json!({"counted": n}))
        }
    }

    fn origin() -> Origin {
        vec![OriginEntry::new("front", 0), OriginEntry::new("counter", 0)]
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn class_tool_wraps_result_and_shares_sly_data() {
        let journal = Arc::new(TextJournal::new());
        let sly = SlyData::new();
        let mut tool = ClassTool::new(
            "counter",
            "count.Counter",
            Some(Arc::new(Counter)),
            args(json!({"n": 3})),
            sly.clone(),
            origin(),
            journal.clone(),
        );

        let messages = tool.build().await.unwrap();
        assert_eq!(messages, vec![AgentMessage::ai("{\"counted\":3}")]);
        assert_eq!(sly.get("count").await, Some(json!(3)));
        assert_eq!(journal.get_logs().await.len(), 1);
    }

    #[tokio::test]
    async fn class_tool_failure_is_an_answer() {
        let mut tool = ClassTool::new(
            "broken",
            "broken.Fails",
            Some(Arc::new(Fails)),
            Map::new(),
            SlyData::new(),
            origin(),
            Arc::new(TextJournal::new()),
        );
        let messages = tool.build().await.unwrap();
        assert_eq!(messages[0].content(), "Error: disk on fire");
    }

    #[tokio::test]
    async fn unresolved_class_is_an_answer() {
        let mut tool = ClassTool::new(
            "ghost",
            "ghost.Tool",
            None,
            Map::new(),
            SlyData::new(),
            origin(),
            Arc::new(TextJournal::new()),
        );
        let messages = tool.build().await.unwrap();
        assert!(messages[0].content().contains("ghost.Tool"));
    }

    fn stash(args: &Map<String, Value>, sly: &mut SlyMap) -> anyhow::Result<Value> {
        sly.insert("stashed".to_string(), args.get("v").cloned().unwrap_or(Value::Null));
        Ok(Value::from("ok"))
    }

    #[tokio::test]
    async fn method_tool_writes_back_sly_data() {
        let sly = SlyData::new();
        let mut tool = MethodTool::new(
            "stasher",
            "legacy.stash",
            Some(stash),
            args(json!({"v": 7})),
            sly.clone(),
            origin(),
            Arc::new(TextJournal::new()),
        );
        let messages = tool.build().await.unwrap();
        assert_eq!(messages[0].content(), "ok");
        assert_eq!(sly.get("stashed").await, Some(json!(7)));
    }
}
