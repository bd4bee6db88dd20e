// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! JSON-RPC 2.0 envelope and method dispatch (C11). Transport-agnostic:
//! both the stdio loop and the HTTP+SSE server call [`handle_request`] and
//! frame the result as their medium requires.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "loxone-mcp-server";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(RpcError { code, message: message.into() }) }
    }

    /// A transport couldn't even parse the incoming message as JSON-RPC, so
    /// there is no request `id` to echo (standard `-32700 Parse error`).
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::err(Value::Null, -32700, format!("parse error: {detail}"))
    }
}

/// Dispatch one JSON-RPC request. Unknown methods yield the standard
/// `-32601` error; tool execution failures surface through the tool
/// result's own `{error: ...}` shape rather than a JSON-RPC error, per the
/// propagation policy (spec §7).
pub async fn handle_request(ctx: &ToolContext, req: RpcRequest) -> RpcResponse {
    let id = req.id.unwrap_or(Value::Null);
    match req.method.as_str() {
        "initialize" => RpcResponse::ok(id, initialize_result()),
        "tools/list" => RpcResponse::ok(id, json!({ "tools": tools::tool_list() })),
        "tools/call" => handle_tools_call(ctx, id, req.params).await,
        "prompts/list" => RpcResponse::ok(id, json!({ "prompts": [] })),
        "resources/list" => RpcResponse::ok(id, json!({ "resources": [] })),
        other => RpcResponse::err(id, -32601, format!("method not found: {other}")),
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "listChanged": false },
        },
    })
}

async fn handle_tools_call(ctx: &ToolContext, id: Value, params: Value) -> RpcResponse {
    let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
        return RpcResponse::err(id, -32602, "missing required param: name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    let result = tools::dispatch(ctx, name, arguments).await;
    RpcResponse::ok(
        id,
        json!({
            "content": [{ "type": "text", "text": result.to_string() }],
            "isError": result.get("error").is_some(),
        }),
    )
}
