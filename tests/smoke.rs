// ABOUTME: End-to-end smoke test serving the bundled registries through the HTTP router.
// ABOUTME: Drives function, connectivity and a streamed turn that calls a coded tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::Request;
use serde_json::{Map, Value, json};
use switchboard_agent::testing::{ScriptedLlmClient, fast_retry_policy};
use switchboard_agent::{AgentServices, CodedTool, CodedToolCtor, CodedToolRegistry};
use switchboard_core::SlyData;
use switchboard_server::{AppState, create_router};
use tower::ServiceExt;

/// Stand-in for the builtin accountant: one unit per call.
struct Tab;

#[async_trait]
impl CodedTool for Tab {
    async fn invoke(&self, _args: &Map<String, Value>, sly_data: &SlyData) -> anyhow::Result<Value> {
        let total = sly_data
            .get("running_cost")
            .await
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            + 1.0;
        sly_data.insert("running_cost", json!(total)).await;
        Ok(json!({ "running_cost": total }))
    }
}

fn tab() -> Arc<dyn CodedTool> {
    Arc::new(Tab)
}

fn manifest() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("registries/manifest.json")
}

/// Helper to create a test AppState over the bundled manifest.
fn test_app_state(client: &ScriptedLlmClient) -> Arc<AppState> {
    let mut coded_tools = CodedToolRegistry::new();
    coded_tools.register("accounting.Accountant", CodedToolCtor::Plain(tab));
    let services = AgentServices::from_manifest(
        &manifest(),
        Some("coded_tools"),
        Arc::new(client.factory()),
        coded_tools,
    )
    .unwrap()
    .with_retry_policy(fast_retry_policy());
    Arc::new(AppState::new(services, Duration::from_secs(60)))
}

/// Helper to extract JSON body from a response.
async fn json_body(resp: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn bundled_networks_are_served() {
    let state = test_app_state(&ScriptedLlmClient::new());

    let resp = create_router(Arc::clone(&state))
        .oneshot(get("/api/v1/networks"))
        .await
        .unwrap();
    assert_eq!(
        json_body(resp).await,
        json!(["hello_world", "music_nerd_pro"]),
        "disabled manifest entries are not served"
    );

    let resp = create_router(Arc::clone(&state))
        .oneshot(get("/api/v1/hello_world/function"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json = json_body(resp).await;
    assert!(
        json["function"]["description"]
            .as_str()
            .unwrap()
            .starts_with("Announces a greeting")
    );

    let resp = create_router(state)
        .oneshot(get("/api/v1/hello_world/connectivity"))
        .await
        .unwrap();
    let json = json_body(resp).await;
    assert_eq!(
        json["connectivity_info"],
        json!([
            {"origin": "announcer", "tools": ["synonymizer"]},
            {"origin": "synonymizer", "tools": []}
        ])
    );
}

#[tokio::test]
async fn streamed_turn_returns_upstream_sly_data() {
    let client = ScriptedLlmClient::new();
    client.push_tool_call("accountant", json!({"reason": "first answer"}));
    client.push_text("The Beatles formed in 1960. Running cost: 1.");
    let state = test_app_state(&client);

    let resp = create_router(state)
        .oneshot(
            Request::post("/api/v1/music_nerd_pro/streaming_chat")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"user_message": {"type": "HUMAN", "text": "When did the Beatles form?"}})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect();

    let answer = events
        .iter()
        .rev()
        .find(|e| e["response"]["type"] == "AI" && e["response"]["origin"].as_array().unwrap().len() == 1)
        .expect("front man answered");
    assert!(answer["response"]["text"].as_str().unwrap().contains("1960"));

    let last = &events.last().unwrap()["response"];
    assert_eq!(last["type"], "AGENT_FRAMEWORK");
    assert!(last["chat_context"]["chat_histories"].is_array());
    assert_eq!(last["sly_data"], json!({"running_cost": 1.0}));
}
