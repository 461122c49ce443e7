//! End-to-end flows over the JSON-RPC surface with the scripted engine.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use tower::ServiceExt;

use toolgate::config::GatewayConfig;
use toolgate::server::build_router;
use toolgate::Gateway;
use toolgate_cdp_adapter::ScriptedEngine;
use toolgate_core_types::{ContentBlock, GatewayResult};
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

fn scripted_gateway() -> Arc<Gateway> {
    let config = GatewayConfig::default();
    Gateway::new(&config, Arc::new(ScriptedEngine::new())).unwrap()
}

async fn rpc(gateway: &Arc<Gateway>, method: &str, params: Value) -> Value {
    let app = build_router(Arc::clone(gateway));
    let request = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn call_tool(gateway: &Arc<Gateway>, name: &str, arguments: Value) -> Value {
    rpc(
        gateway,
        "tools/call",
        json!({ "name": name, "arguments": arguments }),
    )
    .await
}

/// Text concatenation of a result's content blocks.
fn result_text(response: &Value) -> String {
    response["result"]["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn first_json_block(response: &Value) -> &Value {
    response["result"]["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find(|block| block["type"] == "json"))
        .map(|block| &block["json"])
        .expect("result carries a json block")
}

#[tokio::test]
async fn tools_list_returns_the_ordered_catalog() {
    let gateway = scripted_gateway();
    let response = rpc(&gateway, "tools/list", Value::Null).await;

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();

    assert_eq!(names[0], "browser.navigate");
    assert!(names.contains(&"browser.snapshot"));
    assert!(names.contains(&"browser.tabs.close"));
    assert!(names.contains(&"browser.capture.events"));

    // Discovery has no side effects: no session was created.
    assert_eq!(gateway.sessions().count(), 0);

    // Every tool carries a JSON Schema object.
    for tool in tools {
        assert_eq!(tool["input_schema"]["type"], "object");
    }
}

#[tokio::test]
async fn unknown_methods_and_tools_are_classified() {
    let gateway = scripted_gateway();

    let response = rpc(&gateway, "bogus/method", Value::Null).await;
    assert_eq!(response["error"]["code"], -32601);

    let response = call_tool(&gateway, "missing", json!({})).await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"]["kind"], "unknown_tool");
}

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        Ok(vec![ContentBlock::text(
            args["text"].as_str().unwrap_or_default(),
        )])
    }
}

#[tokio::test]
async fn echo_tool_round_trips_through_the_protocol() {
    let gateway = scripted_gateway();
    gateway
        .registry()
        .register(ToolDefinition::new(
            "echo",
            "Echo text back",
            InputSchema::builder()
                .required("text", FieldKind::string(), "Text to echo")
                .build(),
            Arc::new(EchoHandler),
        ))
        .unwrap();

    let response = call_tool(&gateway, "echo", json!({ "text": "hi" })).await;
    assert!(result_text(&response).contains("hi"));

    // Missing required field: validation error listing `text`.
    let response = call_tool(&gateway, "echo", json!({})).await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"]["kind"], "validation");
    let violations = response["error"]["data"]["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0]["field"], "text");
}

#[tokio::test]
async fn navigate_snapshot_click_and_stale_ref_recovery() {
    let gateway = scripted_gateway();

    let response = call_tool(
        &gateway,
        "browser.navigate",
        json!({ "url": "https://example.com/" }),
    )
    .await;
    assert!(result_text(&response).contains("Navigated to https://example.com/"));

    // First snapshot issues generation-1 refs.
    let response = call_tool(&gateway, "browser.snapshot", json!({})).await;
    let snapshot = first_json_block(&response);
    assert_eq!(snapshot["generation"], 1);
    let button_ref = snapshot["tree"]["children"][0]["ref"].as_str().unwrap().to_string();

    let response = call_tool(&gateway, "browser.click", json!({ "ref": button_ref })).await;
    assert!(result_text(&response).contains("Clicked"));

    // A new snapshot supersedes the ref.
    let response = call_tool(&gateway, "browser.snapshot", json!({})).await;
    assert_eq!(first_json_block(&response)["generation"], 2);

    let response = call_tool(&gateway, "browser.click", json!({ "ref": button_ref })).await;
    assert_eq!(response["error"]["code"], -32011);
    assert_eq!(response["error"]["data"]["kind"], "stale_ref");
    assert_eq!(response["error"]["data"]["retryable"], true);

    // Refs that were never issued fail on the caller-input code instead.
    let response = call_tool(&gateway, "browser.click", json!({ "ref": "s9e9" })).await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"]["kind"], "unknown_ref");
}

#[tokio::test]
async fn tab_management_round_trip() {
    let gateway = scripted_gateway();

    // Lazy session creation on first browser-touching call.
    let response = call_tool(&gateway, "browser.tabs.list", json!({})).await;
    let windows = first_json_block(&response)["windows"].as_array().unwrap().clone();
    assert_eq!(windows.len(), 1);
    assert_eq!(gateway.sessions().count(), 1);

    let response = call_tool(
        &gateway,
        "browser.tabs.open",
        json!({ "url": "https://example.com/two" }),
    )
    .await;
    let second_tab = first_json_block(&response)["tab_id"].clone();

    // The new window is active; closing it falls back to the main window.
    let response = call_tool(&gateway, "browser.tabs.close", json!({})).await;
    assert!(result_text(&response).contains("Closed window"));

    let response = call_tool(&gateway, "browser.tabs.list", json!({})).await;
    let windows = first_json_block(&response)["windows"].as_array().unwrap().clone();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0]["is_active"], true);

    // Selecting a window that is gone is a caller error.
    let response = call_tool(&gateway, "browser.tabs.select", json!({ "tab_id": second_tab })).await;
    assert_eq!(response["error"]["code"], -32602);

    // Closing the last remaining window is refused and changes nothing.
    let response = call_tool(&gateway, "browser.tabs.close", json!({})).await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"]["kind"], "last_window");

    let response = call_tool(&gateway, "browser.tabs.list", json!({})).await;
    assert_eq!(
        first_json_block(&response)["windows"].as_array().unwrap().len(),
        1
    );
}

#[tokio::test]
async fn capture_records_navigation_traffic_until_stopped() {
    let gateway = scripted_gateway();
    gateway.start().await;

    let response = call_tool(
        &gateway,
        "browser.capture.start",
        json!({ "domains": ["network"] }),
    )
    .await;
    assert!(result_text(&response).contains("network"));

    call_tool(
        &gateway,
        "browser.navigate",
        json!({ "url": "https://example.com/captured" }),
    )
    .await;

    // The pump runs on its own task; give the broadcast a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = call_tool(&gateway, "browser.capture.stop", json!({})).await;
    assert!(result_text(&response).contains("events"));

    let response = call_tool(&gateway, "browser.capture.events", json!({})).await;
    let events = first_json_block(&response)["events"].as_array().unwrap().clone();
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .any(|event| event["kind"] == "response" && event["status"] == 200));

    // Sequence numbers are strictly increasing.
    let seqs: Vec<i64> = events.iter().map(|event| event["seq"].as_i64().unwrap()).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);

    gateway.stop().await;
}

#[tokio::test]
async fn unknown_capture_domains_are_rejected_with_violations() {
    let gateway = scripted_gateway();
    let response = call_tool(
        &gateway,
        "browser.capture.start",
        json!({ "domains": ["network", "telepathy"] }),
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);
    let violations = response["error"]["data"]["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 1);
}

#[tokio::test]
async fn browser_close_is_idempotent_at_the_protocol_level() {
    let gateway = scripted_gateway();
    call_tool(&gateway, "browser.navigate", json!({ "url": "https://example.com/" })).await;
    assert_eq!(gateway.sessions().count(), 1);

    let response = call_tool(&gateway, "browser.close", json!({})).await;
    assert!(result_text(&response).contains("closed"));
    assert_eq!(gateway.sessions().count(), 0);

    let response = call_tool(&gateway, "browser.close", json!({})).await;
    assert!(result_text(&response).contains("was not open"));
}
