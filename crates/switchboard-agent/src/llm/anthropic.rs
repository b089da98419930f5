// ABOUTME: Anthropic Messages API adapter implementing LlmClient.
// ABOUTME: Builds tool-enabled request bodies and parses text and tool_use blocks back.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ContentBlock, LlmClient, LlmError, LlmMessage, Request, Response, Role, StopReason};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";

/// Calls the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the JSON request body for the Messages API.
    pub fn build_request_body(request: &Request) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "input_schema": tool.input_schema,
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    /// Parse a Messages API response body.
    pub fn parse_response(body: &Value) -> Result<Response, LlmError> {
        let content = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::InvalidResponse("missing content array in response".to_string()))?;

        let mut blocks = Vec::with_capacity(content.len());
        for block in content {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                    blocks.push(ContentBlock::text(text));
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).ok_or_else(|| {
                        LlmError::InvalidResponse("tool_use block missing id".to_string())
                    })?;
                    let name = block.get("name").and_then(Value::as_str).ok_or_else(|| {
                        LlmError::InvalidResponse("tool_use block missing name".to_string())
                    })?;
                    blocks.push(ContentBlock::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: block.get("input").cloned().unwrap_or_else(|| json!({})),
                    });
                }
                _ => {}
            }
        }

        let stop_reason = match body.get("stop_reason").and_then(Value::as_str) {
            Some("end_turn") => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        Ok(Response {
            id: body
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content: blocks,
            stop_reason,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

fn message_to_json(message: &LlmMessage) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content: Vec<Value> = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": content}),
        })
        .collect();
    json!({"role": role, "content": content})
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn create_message(&self, request: &Request) -> Result<Response, LlmError> {
        let body = Self::build_request_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse JSON: {e}")))?;
        Self::parse_response(&body)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    fn sample_request() -> Request {
        let mut request = Request::new(DEFAULT_MODEL);
        request.system = Some("You are the front man.".to_string());
        request.temperature = Some(0.0);
        request.messages = vec![
            LlmMessage {
                role: Role::User,
                content: vec![ContentBlock::text("synonyms for happy")],
            },
            LlmMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "synonymizer".to_string(),
                    input: json!({"word": "happy"}),
                }],
            },
            LlmMessage {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".to_string(),
                    content: "glad".to_string(),
                }],
            },
        ];
        request.tools = vec![ToolDefinition {
            name: "synonymizer".to_string(),
            description: "Finds synonyms".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        request
    }

    #[test]
    fn builds_request_body() {
        let body = AnthropicClient::build_request_body(&sample_request());

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "You are the front man.");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn omits_empty_tools_and_system() {
        let body = AnthropicClient::build_request_body(&Request::new("m"));
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parses_tool_use_response() {
        let body = json!({
            "id": "msg_1",
            "model": DEFAULT_MODEL,
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_2", "name": "synonymizer", "input": {"word": "sad"}}
            ]
        });
        let response = AnthropicClient::parse_response(&body).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.text(), "Let me check.");
        let calls = response.tool_calls();
        assert_eq!(calls[0].id, "toolu_2");
        assert_eq!(calls[0].arguments, json!({"word": "sad"}));
    }

    #[test]
    fn missing_content_is_invalid() {
        let err = AnthropicClient::parse_response(&json!({"id": "x"})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn anthropic_live_round_trip() {
        let (client, model) =
            crate::client::create_llm_client("anthropic", None).expect("ANTHROPIC_API_KEY must be set");
        let mut request = Request::new(model);
        request.messages.push(LlmMessage {
            role: Role::User,
            content: vec![ContentBlock::text("Reply with the single word: pong")],
        });
        let response = client.create_message(&request).await;
        assert!(response.is_ok(), "live test failed: {:?}", response.err());
    }
}
