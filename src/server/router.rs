use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use toolgate_core_types::ToolCall;

use crate::gateway::Gateway;
use crate::metrics;
use crate::translate::translate;

const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer())
        .with_state(AppState { gateway })
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

fn result_envelope(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_envelope(id: Value, code: i64, message: impl Into<String>, data: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into(), "data": data },
    })
}

async fn rpc_handler(State(state): State<AppState>, Json(raw): Json<Value>) -> Json<Value> {
    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(err) => {
            return Json(error_envelope(
                Value::Null,
                INVALID_REQUEST,
                "invalid request envelope",
                json!({ "detail": err.to_string() }),
            ))
        }
    };
    let id = request.id;

    match request.method.as_str() {
        "tools/list" => Json(result_envelope(
            id,
            json!({ "tools": state.gateway.list_tools() }),
        )),
        "tools/call" => {
            let call: ToolCall = match serde_json::from_value(request.params) {
                Ok(call) => call,
                Err(err) => {
                    return Json(error_envelope(
                        id,
                        INVALID_PARAMS,
                        "params must carry `name` and optional `arguments`",
                        json!({ "detail": err.to_string() }),
                    ))
                }
            };
            match state.gateway.call(call).await {
                Ok(content) => Json(result_envelope(id, json!({ "content": content }))),
                Err(err) => {
                    let payload = translate(&err);
                    Json(error_envelope(id, payload.code, payload.message, payload.data))
                }
            }
        }
        other => Json(error_envelope(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method `{other}`"),
            Value::Null,
        )),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let gate = state.gateway.gate();
    Json(json!({
        "status": "ok",
        "sessions": state.gateway.sessions().count(),
        "in_flight": gate.in_flight(),
        "capacity": gate.capacity(),
        "accepting": !gate.is_closed(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metrics::global_registry().gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "metric encode error",
        )
            .into_response();
    }

    match String::from_utf8(buffer) {
        Ok(body) => (
            [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(?err, "prometheus metrics were not valid utf8");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "metric encode error",
            )
                .into_response()
        }
    }
}
