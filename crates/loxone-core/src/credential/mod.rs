// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Credential provider (C1): `host`/`user`/`password` resolve through
//! `clap`'s own CLI-flag-then-env-var merging on
//! [`crate::config::LoxoneConfig`] — spec §4.1's "backends tried in
//! order, first non-empty wins" with exactly one backend, environment
//! variables, shipped (keychain/secret-manager backends are out of scope
//! per spec §1). This module otherwise only resolves the state directory
//! used to persist the sensor log.

/// Resolve the state directory for persisted data (the state-change log).
///
/// Checks `LOXONE_STATE_DIR`, then `$XDG_STATE_HOME/loxone-mcp`, then
/// `$HOME/.local/state/loxone-mcp`, falling back to `.loxone-mcp`.
pub fn state_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("LOXONE_STATE_DIR") {
        return std::path::PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return std::path::PathBuf::from(xdg).join("loxone-mcp");
    }
    if let Ok(home) = std::env::var("HOME") {
        return std::path::PathBuf::from(home).join(".local/state/loxone-mcp");
    }
    std::path::PathBuf::from(".loxone-mcp")
}
