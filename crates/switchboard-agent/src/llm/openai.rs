// ABOUTME: OpenAI Chat Completions adapter implementing LlmClient with function calling.
// ABOUTME: Maps tool results onto `tool` role messages and parses tool_calls back.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ContentBlock, LlmClient, LlmError, Request, Response, Role, StopReason};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Calls the OpenAI Chat Completions API or any compatible endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
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

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(request: &Request) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }

        for message in &request.messages {
            match message.role {
                Role::User => {
                    // Tool results travel as separate `tool` messages.
                    let mut text = Vec::new();
                    for block in &message.content {
                        match block {
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                            } => messages.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "content": content,
                            })),
                            ContentBlock::Text { text: t } => text.push(t.as_str()),
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                    if !text.is_empty() {
                        messages.push(json!({"role": "user", "content": text.join("\n\n")}));
                    }
                }
                Role::Assistant => {
                    let mut text = Vec::new();
                    let mut tool_calls = Vec::new();
                    for block in &message.content {
                        match block {
                            ContentBlock::Text { text: t } => text.push(t.as_str()),
                            ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {"name": name, "arguments": input.to_string()},
                            })),
                            ContentBlock::ToolResult { .. } => {}
                        }
                    }
                    let mut entry = json!({"role": "assistant", "content": text.join("\n\n")});
                    if !tool_calls.is_empty() {
                        entry["tool_calls"] = Value::Array(tool_calls);
                    }
                    messages.push(entry);
                }
            }
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
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
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.input_schema,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    /// Parse a Chat Completions response body.
    pub fn parse_response(body: &Value) -> Result<Response, LlmError> {
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .ok_or_else(|| LlmError::InvalidResponse("missing choices in response".to_string()))?;
        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::InvalidResponse("choice missing message".to_string()))?;

        let mut content = Vec::new();
        if let Some(text) = message.get("content").and_then(Value::as_str)
            && !text.is_empty()
        {
            content.push(ContentBlock::text(text));
        }

        if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                let function = call.get("function").ok_or_else(|| {
                    LlmError::InvalidResponse("tool_call missing function".to_string())
                })?;
                let name = function.get("name").and_then(Value::as_str).ok_or_else(|| {
                    LlmError::InvalidResponse("function missing name".to_string())
                })?;
                let arguments = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let input: Value = serde_json::from_str(arguments).map_err(|e| {
                    LlmError::OutputParsing(format!("failed to parse function arguments: {e}"))
                })?;
                content.push(ContentBlock::ToolUse {
                    id: call
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: name.to_string(),
                    input,
                });
            }
        }

        let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        Ok(Response {
            id: body
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content,
            stop_reason,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn create_message(&self, request: &Request) -> Result<Response, LlmError> {
        let body = Self::build_request_body(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmMessage, ToolDefinition};

    #[test]
    fn tool_results_become_tool_messages() {
        let mut request = Request::new(DEFAULT_MODEL);
        request.system = Some("sys".to_string());
        request.messages = vec![
            LlmMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "synonymizer".to_string(),
                    input: json!({"word": "happy"}),
                }],
            },
            LlmMessage {
                role: Role::User,
                content: vec![
                    ContentBlock::ToolResult {
                        tool_use_id: "call_1".to_string(),
                        content: "glad".to_string(),
                    },
                    ContentBlock::text("and more?"),
                ],
            },
        ];
        request.tools = vec![ToolDefinition {
            name: "synonymizer".to_string(),
            description: "Finds synonyms".to_string(),
            input_schema: json!({"type": "object"}),
        }];

        let body = OpenAiClient::build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], "{\"word\":\"happy\"}");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "synonymizer");
    }

    #[test]
    fn parses_tool_calls() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "synonymizer", "arguments": "{\"word\": \"sad\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let response = OpenAiClient::parse_response(&body).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls()[0].arguments, json!({"word": "sad"}));
        assert!(response.text().is_empty());
    }

    #[test]
    fn malformed_arguments_are_output_parsing_errors() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{"id": "c", "function": {"name": "x", "arguments": "{oops"}}]
                },
                "finish_reason": "tool_calls"
            }]
        });
        assert!(matches!(
            OpenAiClient::parse_response(&body),
            Err(LlmError::OutputParsing(_))
        ));
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn openai_live_round_trip() {
        let (client, model) =
            crate::client::create_llm_client("openai", None).expect("OPENAI_API_KEY must be set");
        let mut request = Request::new(model);
        request.messages.push(LlmMessage {
            role: Role::User,
            content: vec![ContentBlock::text("Reply with the single word: pong")],
        });
        let response = client.create_message(&request).await;
        assert!(response.is_ok(), "live test failed: {:?}", response.err());
    }
}
