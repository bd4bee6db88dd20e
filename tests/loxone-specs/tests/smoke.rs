// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! End-to-end smoke tests: spawn the real `loxone-mcp-server` binary
//! against an in-process mock Miniserver and drive it over HTTP+SSE,
//! covering the seed scenarios (spec §8 S1-S6).

use std::time::Duration;

use loxone_specs::{build_tuple_frame, start_initialized_session, McpProcess, MockMiniserver};
use serde_json::json;

/// S6 — SSE initialize: `GET /sse` with a valid API key, then `initialize`
/// over `/messages`, yields the fixed protocol version and server name
/// within one `event: message` frame.
#[tokio::test]
async fn s6_sse_initialize_returns_server_info() {
    let (_mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    // start_initialized_session() already asserted protocolVersion; check
    // serverInfo too while the session is open.
    let init = session.call("initialize", json!({})).await.expect("second initialize succeeds");
    assert_eq!(init["result"]["serverInfo"]["name"], "loxone-mcp-server");
}

/// S1 — Rolladen up in Living Room: one `Jalousie` device resolves by room,
/// the `up` action is issued, and the tool reports one controlled device.
#[tokio::test]
async fn s1_rolladen_up_in_living_room() {
    let (_mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    let result = session
        .call_tool("control_rolladen", json!({ "room": "Living Room", "action": "up" }))
        .await
        .expect("control_rolladen call succeeds");

    assert_eq!(result["controlled"], 1);
    let results = result["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[0]["action"], "up");
}

/// S2 — Unknown action: no HTTP command is issued, and the tool reports an
/// `Invalid action` error per target device instead of a JSON-RPC failure.
#[tokio::test]
async fn s2_unknown_action_reports_invalid_action_without_dispatch() {
    let (mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    let result = session
        .call_tool("control_rolladen", json!({ "room": "Kitchen", "action": "dance" }))
        .await
        .expect("control_rolladen call succeeds");

    let results = result["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["error"], "Invalid action: dance");
    assert_eq!(mock.getjwt_calls(), 1, "unknown action must not trigger any HTTP command or reauth");
}

/// S4 — 401 recovery: the mock returns one `401` on the first command, the
/// client re-acquires a token exactly once, and the retried command
/// succeeds.
#[tokio::test]
async fn s4_401_recovery_retries_once_and_succeeds() {
    let (mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    let calls_before = mock.getjwt_calls();
    mock.arm_one_401();

    let result = session
        .call_tool("control_rolladen", json!({ "room": "Living Room", "action": "down" }))
        .await
        .expect("control_rolladen call succeeds");

    assert_eq!(result["controlled"], 1);
    assert_eq!(result["results"][0]["success"], true);
    assert_eq!(mock.getjwt_calls(), calls_before + 1, "exactly one re-authentication on 401");
}

/// S3 — Binary frame with one door event: a WebSocket binary frame carrying
/// `(uuid, 0.0)` updates the state mirror, which `get_device_status`
/// surfaces through the matching device's state reference.
#[tokio::test]
async fn s3_binary_frame_updates_device_state() {
    let (mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    // Give the WebSocket client a moment to finish its handshake before the
    // frame is pushed, otherwise it lands before enablebinstatusupdate acks.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state_uuid: uuid::Uuid = "00000000-0000-0000-0000-0000007a0f00".parse().unwrap();
    mock.inject_ws_frame(build_tuple_frame(state_uuid, 0.0));

    let mut observed = None;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = session
            .call_tool("get_system_status", json!({}))
            .await
            .expect("get_system_status call succeeds");
        let accepted = status["ws"]["tuples_accepted"].as_u64().unwrap_or(0);
        if accepted > 0 {
            observed = Some(accepted);
            break;
        }
    }

    assert!(observed.is_some(), "expected at least one accepted tuple after the injected frame");
}

/// The SSE transport rejects requests made without the configured API key.
#[tokio::test]
async fn sse_requires_the_configured_api_key() {
    let mock = MockMiniserver::start().await.expect("mock starts");
    let process = McpProcess::start(&mock).await.expect("process starts");

    let resp = reqwest::Client::new()
        .get(format!("{}/sse", process.base_url()))
        .send()
        .await
        .expect("request completes");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

/// `/health` never requires authentication, even with `require_auth` set.
#[tokio::test]
async fn health_endpoint_is_never_authenticated() {
    let mock = MockMiniserver::start().await.expect("mock starts");
    let process = McpProcess::start(&mock).await.expect("process starts");

    let resp = reqwest::Client::new()
        .get(format!("{}/health", process.base_url()))
        .send()
        .await
        .expect("request completes");
    assert!(resp.status().is_success());
}

/// Sanity check that the session helper actually reaches `SseSession`
/// without needing the full scenario convenience function.
#[tokio::test]
async fn tools_list_reports_every_documented_tool() {
    let (_mock, _process, mut session) = start_initialized_session().await.expect("session starts");

    let result = session.call("tools/list", json!({})).await.expect("tools/list succeeds");
    let tools = result["result"]["tools"].as_array().expect("tools array");
    assert!(tools.iter().any(|t| t["name"] == "control_rolladen"));
    assert!(tools.iter().any(|t| t["name"] == "get_system_status"));
    assert!(tools.len() > 30);
}
