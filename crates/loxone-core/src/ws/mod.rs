// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! WebSocket client and binary frame parser (C5).

pub mod client;
pub mod frame;

pub use client::LoxoneWsClient;
