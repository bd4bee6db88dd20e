// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! WebSocket client (C5): authenticates over the `remotecontrol`
//! subprotocol, enables binary status updates, and feeds every decoded
//! `(UUID, value)` tuple into the state mirror. Reconnects on a fixed delay
//! rather than with backoff, per the adapter's explicit redesign away from
//! the upstream bridge's exponential-backoff reconnect loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::LoxoneError;
use crate::http::urlencode;
use crate::state::StateMirror;
use crate::token::TokenManager;
use crate::value::Value;
use crate::ws::frame;

const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Live WebSocket session to one Miniserver, run to completion or
/// cancellation by [`LoxoneWsClient::run`].
pub struct LoxoneWsClient {
    host: String,
    port: u16,
    reconnect_delay: Duration,
    max_reconnect_attempts: i64,
    state: RwLock<WsConnectionState>,
    cancel: CancellationToken,
    tuples_scanned: AtomicU64,
    tuples_accepted: AtomicU64,
}

impl LoxoneWsClient {
    pub fn new(host: String, port: u16, reconnect_delay: Duration, max_reconnect_attempts: i64) -> Self {
        Self {
            host,
            port,
            reconnect_delay,
            max_reconnect_attempts,
            state: RwLock::new(WsConnectionState::Disconnected),
            cancel: CancellationToken::new(),
            tuples_scanned: AtomicU64::new(0),
            tuples_accepted: AtomicU64::new(0),
        }
    }

    /// Cumulative `(tuples scanned, tuples accepted)` since connect, so
    /// operators can detect firmware changes that break the overlapping-scan
    /// heuristic (spec §9 design note).
    pub fn scan_metrics(&self) -> (u64, u64) {
        (self.tuples_scanned.load(Ordering::Relaxed), self.tuples_accepted.load(Ordering::Relaxed))
    }

    pub async fn connection_state(&self) -> WsConnectionState {
        *self.state.read().await
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Drive reconnect attempts until cancelled or `max_reconnect_attempts`
    /// (negative means unlimited) is exhausted (spec §4.5 reconnect policy).
    pub async fn run(&self, token: Arc<TokenManager>, mirror: Arc<StateMirror>) -> Result<(), LoxoneError> {
        let mut attempts: i64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                *self.state.write().await = WsConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write().await = WsConnectionState::Connecting;
            match self.connect_and_serve(&token, &mirror).await {
                Ok(()) => {
                    *self.state.write().await = WsConnectionState::Disconnected;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(err = %e, "websocket session ended, scheduling reconnect");
                    attempts += 1;
                    if self.max_reconnect_attempts >= 0 && attempts > self.max_reconnect_attempts {
                        *self.state.write().await = WsConnectionState::Disconnected;
                        return Err(e);
                    }
                    *self.state.write().await = WsConnectionState::Reconnecting;
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = self.cancel.cancelled() => {
                            *self.state.write().await = WsConnectionState::Disconnected;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_serve(
        &self,
        token: &TokenManager,
        mirror: &StateMirror,
    ) -> Result<(), LoxoneError> {
        let url = format!("ws://{}:{}/ws/rfc6455", self.host, self.port);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| LoxoneError::Transport(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            "remotecontrol".parse().map_err(|_| LoxoneError::Transport("invalid header".to_owned()))?,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| LoxoneError::Transport(e.to_string()))?;
        *self.state.write().await = WsConnectionState::Connected;

        let (mut write, mut read) = ws_stream.split();

        let jwt = token.current_token().await.ok_or(LoxoneError::Unauthorized)?;
        let auth_cmd = format!("authwithtoken/{}/{}", jwt, urlencode(&token.user));
        write
            .send(Message::Text(auth_cmd.into()))
            .await
            .map_err(|e| LoxoneError::Transport(e.to_string()))?;
        wait_for_ll_ack(&mut read).await?;

        write
            .send(Message::Text("jdev/sps/enablebinstatusupdate".into()))
            .await
            .map_err(|e| LoxoneError::Transport(e.to_string()))?;
        wait_for_ll_ack(&mut read).await?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                received = tokio::time::timeout(KEEPALIVE_TIMEOUT, read.next()) => {
                    match received {
                        Ok(Some(Ok(Message::Binary(data)))) => {
                            self.handle_binary_frame(&data, mirror).await;
                        }
                        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                            return Err(LoxoneError::Transport("connection closed by peer".to_owned()));
                        }
                        Ok(Some(Ok(Message::Text(text)))) => {
                            log_non_success_ll_code(&text);
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => return Err(LoxoneError::Transport(e.to_string())),
                        Err(_elapsed) => {
                            write
                                .send(Message::Text("keepalive".into()))
                                .await
                                .map_err(|e| LoxoneError::Transport(e.to_string()))?;
                        }
                    }
                }
            }
        }
    }

    async fn handle_binary_frame(&self, data: &[u8], mirror: &StateMirror) {
        let Some((_header, payload)) = frame::parse_header(data) else { return };
        if payload.len() < 24 {
            return;
        }
        let scan = if payload.len() > frame::COOPERATIVE_YIELD_THRESHOLD {
            frame::scan_tuples_cooperative(payload).await
        } else {
            frame::scan_tuples(payload)
        };
        self.tuples_scanned.fetch_add(scan.scanned, Ordering::Relaxed);
        self.tuples_accepted.fetch_add(scan.accepted, Ordering::Relaxed);
        for (uuid, value) in scan.tuples {
            mirror.apply(uuid, Value::Double(value)).await;
        }
    }
}

fn is_ll_success(text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else { return false };
    let code = &value["LL"]["code"];
    matches!(code, serde_json::Value::String(s) if s == "200")
        || matches!(code, serde_json::Value::Number(n) if n.as_i64() == Some(200))
}

/// Logs a non-200 `LL.code` reply received outside the auth handshake, since
/// spec §4.5 requires these be observable but not tear down the connection.
/// Silently ignores anything that isn't a well-formed `LL` envelope (e.g. a
/// bare `keepalive` echo).
fn log_non_success_ll_code(text: &str) {
    if is_ll_success(text) {
        return;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else { return };
    if value.get("LL").is_none() {
        return;
    }
    tracing::debug!(code = %value["LL"]["code"], control = %value["LL"]["control"], "non-success LL.code on websocket session");
}

/// Wait for a text response whose `LL.code` is `200`, bounded to
/// `AUTH_ACK_TIMEOUT` (spec §4.5 open question: the handshake blocks on an
/// explicit acknowledgement rather than assuming success).
async fn wait_for_ll_ack<S>(read: &mut S) -> Result<(), LoxoneError>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::Instant::now() + AUTH_ACK_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(LoxoneError::Timeout);
        }
        match tokio::time::timeout(remaining, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                if is_ll_success(&text) {
                    return Ok(());
                }
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => return Err(LoxoneError::Transport(e.to_string())),
            Ok(None) => return Err(LoxoneError::Transport("connection closed during handshake".to_owned())),
            Err(_) => return Err(LoxoneError::Timeout),
        }
    }
}
