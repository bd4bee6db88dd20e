// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use clap::{Parser, Subcommand};
use loxone_core::LoxoneConfig;
use loxone_mcp::ServeMode;
use tracing::error;

/// CLI surface (spec §6): `server` and `sse` are this crate's core; `setup`,
/// `verify`, and `clear` are credential-management collaborators out of
/// this repository's scope (spec §1) and exit `1` pointing at that.
#[derive(Parser)]
#[command(name = "loxone-mcp-server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP over stdio (standard MCP host integration).
    Server {
        #[command(flatten)]
        config: LoxoneConfig,
    },
    /// Serve MCP over HTTP with a Server-Sent-Events transport.
    Sse {
        #[command(flatten)]
        config: LoxoneConfig,

        /// Bind host for the HTTP+SSE listener.
        #[arg(long, default_value = "127.0.0.1", env = "LOXONE_SSE_HOST")]
        sse_host: String,

        /// Bind port for the HTTP+SSE listener.
        #[arg(long, default_value_t = 8000, env = "LOXONE_SSE_PORT")]
        sse_port: u16,

        /// Bearer/API-key required on every non-health route.
        #[arg(long, env = "LOXONE_SSE_API_KEY")]
        sse_api_key: Option<String>,

        /// Require the API key even if one hasn't been set (fails closed).
        #[arg(long, default_value_t = false, env = "LOXONE_SSE_REQUIRE_AUTH")]
        sse_require_auth: bool,
    },
    /// Interactive credential setup (out of scope for this build).
    Setup,
    /// Verify stored credentials against the Miniserver (out of scope).
    Verify,
    /// Clear stored credentials (out of scope).
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let outcome = match cli.command {
        Command::Server { config } => loxone_mcp::run(config, ServeMode::Stdio).await,
        Command::Sse { config, sse_host, sse_port, sse_api_key, sse_require_auth } => {
            loxone_mcp::run(
                config,
                ServeMode::HttpSse {
                    host: sse_host,
                    port: sse_port,
                    api_key: sse_api_key,
                    require_auth: sse_require_auth,
                },
            )
            .await
        }
        Command::Setup | Command::Verify | Command::Clear => {
            eprintln!(
                "credential setup/verify/clear are handled by the CLI's credential-management \
                 collaborator, not this build; configure via LOXONE_HOST/LOXONE_USER/LOXONE_PASS \
                 (or a secret store) and run `server`/`sse` directly"
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
