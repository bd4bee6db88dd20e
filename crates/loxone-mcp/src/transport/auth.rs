// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Bearer/API-key authentication for the HTTP+SSE transport (spec §4.11).
//! Every non-health route requires either `Authorization: Bearer {key}` or
//! `X-API-Key: {key}`, compared in constant time. Grounded on the same
//! pattern as a bearer-token proxy layer in the corpus, adapted from a
//! single-scheme check to the two header forms this spec requires.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::transport::http::SseState;

/// Constant-time string comparison to avoid a timing side-channel on the
/// configured API key.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn extract_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token);
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok())
}

fn unauthorized() -> Response {
    let mut resp = (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    resp.headers_mut().insert(axum::http::header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    resp
}

/// Whether a request to `path` carrying `headers` passes the configured API
/// key check. Pulled out of [`auth_layer`] so the decision can be unit
/// tested without standing up an axum `Next`.
fn is_authorized(require_auth: bool, api_key: Option<&str>, path: &str, headers: &HeaderMap) -> bool {
    if path == "/health" || !require_auth {
        return true;
    }
    let Some(expected) = api_key else {
        // require_auth with no configured key can never be satisfied; fail
        // closed rather than silently serving every request unauthenticated.
        return false;
    };
    matches!(extract_key(headers), Some(key) if constant_time_eq(key, expected))
}

/// Axum middleware enforcing the API key on every route except `/health`.
/// A no-op when `require_auth` is unset on [`SseState`].
pub async fn auth_layer(
    State(state): State<SseState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if is_authorized(state.require_auth, state.api_key.as_deref(), req.uri().path(), req.headers()) {
        next.run(req).await
    } else {
        unauthorized()
    }
}
