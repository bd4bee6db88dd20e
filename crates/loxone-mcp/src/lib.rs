// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! MCP tool surface and transport server (C10, C11) over a `loxone-core`
//! client: the fixed set of tools enumerated in spec §6, dispatched
//! through the JSON-RPC 2.0 envelope in [`rpc`], carried over stdio or
//! HTTP+SSE (see [`transport`]).

pub mod context;
pub mod normalize;
pub mod rpc;
pub mod tools;
pub mod transport;

use std::sync::Arc;

use loxone_core::{LoxoneClient, LoxoneConfig};

use crate::context::ToolContext;

/// What transport to serve MCP JSON-RPC over (spec §4.11, §6 CLI surface).
pub enum ServeMode {
    /// Line-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP + Server-Sent-Events, bound to `host:port`.
    HttpSse { host: String, port: u16, api_key: Option<String>, require_auth: bool },
}

/// Connect to the Miniserver and serve MCP over the requested transport
/// until shutdown. Owns the `LoxoneClient` for the process lifetime and
/// performs an orderly shutdown (WS loop stop, log sync, token kill) once
/// the transport loop returns.
pub async fn run(config: LoxoneConfig, mode: ServeMode) -> anyhow::Result<()> {
    let client = Arc::new(LoxoneClient::connect(config).await?);
    let ctx = ToolContext::new(Arc::clone(&client));

    let result = match mode {
        ServeMode::Stdio => transport::stdio::run(ctx).await,
        ServeMode::HttpSse { host, port, api_key, require_auth } => {
            transport::http::run(ctx, &host, port, api_key, require_auth).await
        }
    };

    client.shutdown().await;
    result
}
