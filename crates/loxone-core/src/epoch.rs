// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Conversions between Unix time and the Miniserver's custom epoch
//! (seconds since 2009-01-01T00:00:00Z), named so the offset can never be
//! applied twice or forgotten at a call site.

/// Unix-seconds offset of the Loxone epoch (2009-01-01T00:00:00Z).
pub const LOXONE_EPOCH_OFFSET: i64 = 1_230_768_000;

pub fn to_loxone_epoch(unix_seconds: i64) -> i64 {
    unix_seconds - LOXONE_EPOCH_OFFSET
}

pub fn from_loxone_epoch(loxone_seconds: i64) -> i64 {
    loxone_seconds + LOXONE_EPOCH_OFFSET
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn now_loxone() -> i64 {
    to_loxone_epoch(now_unix())
}
