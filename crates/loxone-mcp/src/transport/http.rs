// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! HTTP + Server-Sent-Events MCP transport (spec §4.11 mode 2, Streamable
//! HTTP variant). Routes:
//!
//! - `GET /health` — 200 `"OK"`, never authenticated.
//! - `POST /messages?session_id=...` — one JSON-RPC request in, `204` out;
//!   the actual JSON-RPC response is dispatched as an `event: message`
//!   frame on that session's SSE stream.
//! - `GET /sse` — opens a session; the first frame is `event: endpoint`
//!   naming the `/messages` URL for this session, followed by `event:
//!   message` frames and periodic `event: ping` keepalives.
//!
//! Grounded on a proxy's axum router/handler split in the corpus (route
//! table shape, bearer-auth middleware) adapted from a REST+WS surface to
//! POST-in/SSE-out with per-session ordering.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::middleware;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::context::ToolContext;
use crate::rpc::{self, RpcRequest};
use crate::transport::auth::auth_layer;

/// One open `/sse` connection: the channel its frames are pushed through,
/// plus a lock serializing `/messages` dispatch+emit so that responses
/// within a session are emitted in request-arrival order (spec §4.11
/// ordering guarantee, §5).
struct SessionHandle {
    tx: mpsc::UnboundedSender<Event>,
    order: Arc<Mutex<()>>,
}

type Sessions = Arc<RwLock<HashMap<String, SessionHandle>>>;

#[derive(Clone)]
pub struct SseState {
    ctx: ToolContext,
    sessions: Sessions,
    pub api_key: Option<String>,
    pub require_auth: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: Option<String>,
}

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(
    ctx: ToolContext,
    host: &str,
    port: u16,
    api_key: Option<String>,
    require_auth: bool,
) -> anyhow::Result<()> {
    let state =
        SseState { ctx, sessions: Arc::new(RwLock::new(HashMap::new())), api_key, require_auth };

    let router = Router::new()
        .route("/health", get(health))
        .route("/messages", post(post_message))
        .route("/sse", get(sse_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .with_state(state);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "loxone-mcp-server listening (HTTP+SSE)");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    "OK"
}

/// Removes the session from the registry once the SSE stream for it ends
/// (client disconnect or channel closure), whichever happens first.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.id);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            sessions.write().await.remove(&id);
        });
    }
}

async fn sse_handler(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let order = Arc::new(Mutex::new(()));
    state.sessions.write().await.insert(session_id.clone(), SessionHandle { tx: tx.clone(), order });

    let endpoint_event =
        Event::default().event("endpoint").data(format!("/messages?session_id={session_id}"));
    let _ = tx.send(endpoint_event);

    spawn_ping_task(tx, session_id.clone(), Arc::clone(&state.sessions));

    let guard = SessionGuard { id: session_id, sessions: state.sessions };
    Sse::new(receiver_stream(rx, guard))
}

/// Sends `event: ping` frames roughly every 30 seconds until the session's
/// channel closes (client disconnected and the guard dropped the sender).
fn spawn_ping_task(tx: mpsc::UnboundedSender<Event>, session_id: String, sessions: Sessions) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        interval.tick().await; // first tick fires immediately; consume it
        loop {
            interval.tick().await;
            if !sessions.read().await.contains_key(&session_id) {
                break;
            }
            if tx.send(Event::default().event("ping").data("")).is_err() {
                break;
            }
        }
    });
}

fn receiver_stream(
    rx: mpsc::UnboundedReceiver<Event>,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        rx.recv().await.map(|event| (Ok(event), (rx, guard)))
    })
}

/// `POST /messages?session_id=...`: dispatches one JSON-RPC request and
/// pushes the response to that session's SSE stream as `event: message`,
/// per the Streamable HTTP variant (spec §4.11). Responds `204` once the
/// frame has been queued; `404` for an unknown or expired session.
async fn post_message(
    State(state): State<SseState>,
    Query(params): Query<MessagesQuery>,
    Json(req): Json<RpcRequest>,
) -> impl IntoResponse {
    use axum::http::StatusCode;

    let Some(session_id) = params.session_id else {
        return (StatusCode::BAD_REQUEST, "missing session_id").into_response();
    };

    let (tx, order) = {
        let sessions = state.sessions.read().await;
        let Some(handle) = sessions.get(&session_id) else {
            return (StatusCode::NOT_FOUND, "unknown session_id").into_response();
        };
        (handle.tx.clone(), Arc::clone(&handle.order))
    };

    // Hold the per-session lock across dispatch+emit so concurrent POSTs to
    // the same session can never emit out of arrival order.
    let _permit = order.lock().await;
    let response = rpc::handle_request(&state.ctx, req).await;
    let payload = match serde_json::to_string(&response) {
        Ok(payload) => payload,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode response: {e}"))
                .into_response();
        }
    };
    let _ = tx.send(Event::default().event("message").data(payload));

    StatusCode::NO_CONTENT.into_response()
}
