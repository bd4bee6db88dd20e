// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `loxone-mcp-server` binary as a subprocess, pointed at
//! an in-process mock Miniserver (HTTP command endpoints + `remotecontrol`
//! WebSocket), and exercises it over the HTTP+SSE MCP transport.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxPath, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Resolve the path to the compiled `loxone-mcp-server` binary.
pub fn server_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/loxone-specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("loxone-mcp-server")
}

fn ll_ok(value: Value) -> Json<Value> {
    Json(json!({ "LL": { "code": "200", "value": value } }))
}

fn ll_err(code: &str) -> Json<Value> {
    Json(json!({ "LL": { "code": code, "value": "" } }))
}

/// A fixture `LoxAPP3.json` with one `Jalousie` in each of two rooms,
/// matching the device shape scenarios S1/S2 describe.
pub fn fixture_structure() -> Value {
    json!({
        "msInfo": {
            "projectName": "Test Home",
            "swVersion": "12.0.1.1",
            "location": "Testville",
        },
        "rooms": {
            "10000000-0000-0000-0000-000000000001": { "name": "Living Room" },
            "10000000-0000-0000-0000-000000000002": { "name": "Kitchen" },
        },
        "cats": {
            "20000000-0000-0000-0000-000000000001": { "name": "shading" },
        },
        "controls": {
            "30000000-0000-0000-0000-000000000001": {
                "name": "Rolladen Wohnzimmer",
                "type": "Jalousie",
                "room": "10000000-0000-0000-0000-000000000001",
                "cat": "20000000-0000-0000-0000-000000000001",
                "states": { "up": "state-up-1", "down": "state-down-1" },
            },
            "30000000-0000-0000-0000-000000000002": {
                "name": "Rolladen Kueche",
                "type": "Jalousie",
                "room": "10000000-0000-0000-0000-000000000002",
                "cat": "20000000-0000-0000-0000-000000000001",
                "states": { "up": "state-up-2", "down": "state-down-2" },
            },
        },
    })
}

#[derive(Clone)]
struct MockState {
    structure: Value,
    io_401_once: Arc<AtomicBool>,
    getjwt_count: Arc<AtomicUsize>,
    ws_inject: broadcast::Sender<Vec<u8>>,
}

async fn reachability(State(_state): State<MockState>) -> impl IntoResponse {
    ll_ok(json!({ "snr": "504F94112233" }))
}

async fn getkey2(State(_state): State<MockState>, AxPath(_user): AxPath<String>) -> impl IntoResponse {
    ll_ok(json!({ "key": "deadbeef", "salt": "cafebabe", "hashAlg": "SHA1" }))
}

/// Loxone-epoch `validUntil` an hour in the future, so `ensure_fresh` never
/// forces an unprompted refresh mid-test.
fn valid_until_epoch() -> i64 {
    const LOXONE_EPOCH_OFFSET: i64 = 1_230_768_000;
    let now_unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    now_unix - LOXONE_EPOCH_OFFSET + 3600
}

async fn getjwt(State(state): State<MockState>, AxPath(_rest): AxPath<String>) -> impl IntoResponse {
    let n = state.getjwt_count.fetch_add(1, Ordering::SeqCst) + 1;
    ll_ok(json!({
        "token": format!("test-jwt-{n}"),
        "validUntil": valid_until_epoch(),
        "tokenRights": 4,
        "key": "00",
    }))
}

async fn refreshjwt(AxPath(_rest): AxPath<String>) -> impl IntoResponse {
    ll_ok(json!(""))
}

async fn killtoken(AxPath(_rest): AxPath<String>) -> impl IntoResponse {
    ll_ok(json!(""))
}

async fn structure_file(State(state): State<MockState>) -> impl IntoResponse {
    ll_ok(state.structure.clone())
}

/// `GET /jdev/sps/io/{uuid}/{command}`: returns one `401` the first time
/// `io_401_once` is armed (spec §8 scenario S4), then `200` thereafter.
async fn command_io(
    State(state): State<MockState>,
    AxPath((_uuid, _command)): AxPath<(String, String)>,
) -> impl IntoResponse {
    if state.io_401_once.swap(false, Ordering::SeqCst) {
        return ll_err("401").into_response();
    }
    ll_ok(json!("OK")).into_response()
}

async fn ws_handler(State(state): State<MockState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Acks `authwithtoken`/`enablebinstatusupdate`/`keepalive` text frames with
/// an `LL.code=200` response, and forwards any bytes pushed through
/// `ws_inject` as a binary frame (used to simulate door/window events, S3).
async fn handle_socket(mut socket: WebSocket, state: MockState) {
    let mut inject_rx = state.ws_inject.subscribe();
    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(_))) => {
                        let ack = r#"{"LL":{"code":"200","value":"OK"}}"#;
                        if socket.send(Message::Text(ack.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            frame = inject_rx.recv() => {
                match frame {
                    Ok(bytes) => {
                        if socket.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// An in-process mock Miniserver: HTTP command endpoints plus the
/// `remotecontrol` WebSocket, bound to a real TCP port so the real
/// `loxone-mcp-server` binary can connect to it as a subprocess.
pub struct MockMiniserver {
    port: u16,
    io_401_once: Arc<AtomicBool>,
    getjwt_count: Arc<AtomicUsize>,
    ws_inject: broadcast::Sender<Vec<u8>>,
    serve_task: JoinHandle<()>,
}

impl MockMiniserver {
    pub async fn start() -> anyhow::Result<Self> {
        let (ws_inject, _rx) = broadcast::channel(16);
        let state = MockState {
            structure: fixture_structure(),
            io_401_once: Arc::new(AtomicBool::new(false)),
            getjwt_count: Arc::new(AtomicUsize::new(0)),
            ws_inject,
        };

        let router = Router::new()
            .route("/jdev/cfg/apiKey", get(reachability))
            .route("/jdev/sys/getkey2/{user}", get(getkey2))
            .route("/jdev/sys/getjwt/{*rest}", get(getjwt))
            .route("/jdev/sys/refreshjwt/{*rest}", get(refreshjwt))
            .route("/jdev/sys/killtoken/{*rest}", get(killtoken))
            .route("/data/LoxAPP3.json", get(structure_file))
            .route("/jdev/sps/io/{uuid}/{command}", get(command_io))
            .route("/ws/rfc6455", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let serve_task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            port,
            io_401_once: state.io_401_once,
            getjwt_count: state.getjwt_count,
            ws_inject: state.ws_inject,
            serve_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Arm the next `GET /jdev/sps/io/...` call to fail with `401` once.
    pub fn arm_one_401(&self) {
        self.io_401_once.store(true, Ordering::SeqCst);
    }

    pub fn getjwt_calls(&self) -> usize {
        self.getjwt_count.load(Ordering::SeqCst)
    }

    /// Push a raw binary WebSocket frame to every connected client (the
    /// real server holds exactly one connection at a time).
    pub fn inject_ws_frame(&self, bytes: Vec<u8>) {
        let _ = self.ws_inject.send(bytes);
    }
}

impl Drop for MockMiniserver {
    fn drop(&mut self) {
        self.serve_task.abort();
    }
}

/// Build one 32-byte binary frame: an 8-byte header declaring a 24-byte
/// payload, followed by a `(UUID, f64)` tuple (spec §4.5, §8 scenario S3).
pub fn build_tuple_frame(uuid: uuid::Uuid, value: f64) -> Vec<u8> {
    let mut frame = Vec::with_capacity(32);
    frame.extend_from_slice(&[0u8, 0, 0, 0]); // bin_type, identifier, info_flags, reserved
    frame.extend_from_slice(&24u32.to_le_bytes());
    frame.extend_from_slice(uuid.as_bytes());
    frame.extend_from_slice(&value.to_le_bytes());
    frame
}

/// A running `loxone-mcp-server` process, serving HTTP+SSE, killed on drop.
pub struct McpProcess {
    child: Child,
    sse_port: u16,
    api_key: String,
    _log_dir: tempfile::TempDir,
}

impl McpProcess {
    /// Spawn the server in `sse` mode pointed at `mock`'s HTTP/WS endpoints.
    pub async fn start(mock: &MockMiniserver) -> anyhow::Result<Self> {
        let binary = server_binary();
        anyhow::ensure!(binary.exists(), "loxone-mcp-server binary not found at {}", binary.display());

        let sse_port = free_port()?;
        let log_dir = tempfile::tempdir()?;
        let api_key = "test-api-key".to_owned();

        let child = Command::new(&binary)
            .arg("sse")
            .args(["--host", "127.0.0.1"])
            .args(["--port", &mock.port().to_string()])
            .args(["--user", "test"])
            .args(["--password", "test"])
            .args(["--sse-host", "127.0.0.1"])
            .args(["--sse-port", &sse_port.to_string()])
            .args(["--sse-api-key", &api_key])
            .args(["--sse-require-auth", "true"])
            .args(["--log-path", &log_dir.path().join("state.json").to_string_lossy()])
            .args(["--discovery-window-secs", "2"])
            .args(["--log-level", "warn"])
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let process = Self { child, sse_port, api_key, _log_dir: log_dir };
        process.wait_healthy(Duration::from_secs(10)).await?;
        Ok(process)
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.sse_port)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("loxone-mcp-server did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for McpProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Minimal manual SSE client: connects to `/sse`, then exposes a JSON-RPC
/// request/response round trip over `/messages` + the next `event: message`
/// frame. Good enough for black-box scenario tests; not a general SSE
/// client.
pub struct SseSession {
    resp: reqwest::Response,
    buf: String,
    messages_url: String,
    client: reqwest::Client,
    api_key: String,
}

impl SseSession {
    pub async fn connect(process: &McpProcess) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let resp = client
            .get(format!("{}/sse", process.base_url()))
            .header("x-api-key", process.api_key())
            .header("accept", "text/event-stream")
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "sse connect failed: {}", resp.status());

        let mut session = Self {
            resp,
            buf: String::new(),
            messages_url: String::new(),
            client,
            api_key: process.api_key().to_owned(),
        };

        let (event, data) = session.next_event().await?;
        anyhow::ensure!(event == "endpoint", "expected endpoint event first, got {event}");
        session.messages_url = format!("{}{}", process.base_url(), data);
        Ok(session)
    }

    /// Read the next raw `(event, data)` SSE frame, skipping `ping`s.
    pub async fn next_event(&mut self) -> anyhow::Result<(String, String)> {
        loop {
            if let Some(idx) = self.buf.find("\n\n") {
                let raw: String = self.buf.drain(..idx + 2).collect();
                let mut event = "message".to_owned();
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event = rest.to_owned();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(rest);
                    }
                }
                if event == "ping" {
                    continue;
                }
                return Ok((event, data));
            }
            let chunk = self
                .resp
                .chunk()
                .await?
                .ok_or_else(|| anyhow::anyhow!("sse stream closed before a matching event arrived"))?;
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// POST one JSON-RPC request, then wait for the matching `event:
    /// message` response on the SSE stream.
    pub async fn call(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = 1;
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let resp = self
            .client
            .post(&self.messages_url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        anyhow::ensure!(resp.status().as_u16() == 204, "POST /messages: {}", resp.status());

        let (event, data) = self.next_event().await?;
        anyhow::ensure!(event == "message", "expected message event, got {event}");
        Ok(serde_json::from_str(&data)?)
    }

    /// Call a tool by name and parse its JSON result out of the MCP
    /// `content[0].text` wrapper.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let response = self.call("tools/call", json!({ "name": name, "arguments": arguments })).await?;
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("tool response missing content[0].text: {response}"))?;
        Ok(serde_json::from_str(text)?)
    }
}

/// Convenience: start a mock Miniserver and the real server pointed at it,
/// then open and initialize one SSE session.
pub async fn start_initialized_session() -> anyhow::Result<(MockMiniserver, McpProcess, SseSession)> {
    let mock = MockMiniserver::start().await?;
    let process = McpProcess::start(&mock).await?;
    let mut session = SseSession::connect(&process).await?;
    let init = session.call("initialize", json!({})).await?;
    anyhow::ensure!(
        init["result"]["protocolVersion"] == "2025-03-26",
        "unexpected initialize result: {init}"
    );
    Ok((mock, process, session))
}
