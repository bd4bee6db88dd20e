// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Line-delimited JSON-RPC over stdin/stdout (spec §4.11 mode 1).
//!
//! Each line of stdin is one JSON-RPC request; each response is written to
//! stdout as one line of JSON followed by `\n`. A line that fails to parse
//! yields a standard `-32700` parse-error response with a `null` id rather
//! than killing the loop, matching the propagation policy in spec §7
//! ("Decode" errors are logged and skipped, never fatal to the session).

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::context::ToolContext;
use crate::rpc::{self, RpcRequest, RpcResponse};

pub async fn run(ctx: ToolContext) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(req) => rpc::handle_request(&ctx, req).await,
            Err(e) => {
                tracing::debug!(err = %e, "stdio transport: failed to parse request line");
                RpcResponse::parse_error(e)
            }
        };

        write_response(&mut stdout, &response).await?;
    }

    Ok(())
}

async fn write_response(stdout: &mut io::Stdout, response: &RpcResponse) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
