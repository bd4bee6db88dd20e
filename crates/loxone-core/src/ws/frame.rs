// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Binary frame header and the permissive overlapping tuple scan (spec §4.5).
//!
//! Gen-1 Miniservers do not strictly adhere to the documented event-table
//! format, so the scanner does not trust the header's declared message type
//! to pick a decoder. Instead it scans every byte offset of the payload for
//! a `(UUID, f64)` window, accepting a tuple only when the UUID parses and
//! the value falls in a plausible band, and advances 8 bytes past a hit (1
//! byte otherwise) to tolerate both properly framed and jittered payloads.

use uuid::Uuid;

/// The 8-byte header that precedes every binary WebSocket frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub bin_type: u8,
    pub identifier: u8,
    pub info_flags: u8,
    pub reserved: u8,
    pub payload_length: u32,
}

/// Parse the 8-byte header and return it along with the payload slice that
/// follows. The payload slice is capped to what is actually present — a
/// frame shorter than its declared `payload_length` is accepted gracefully
/// rather than rejected (spec §4.5).
pub fn parse_header(data: &[u8]) -> Option<(BinaryHeader, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let header = BinaryHeader {
        bin_type: data[0],
        identifier: data[1],
        info_flags: data[2],
        reserved: data[3],
        payload_length: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
    };
    let available = data.len() - 8;
    let take = (header.payload_length as usize).min(available);
    Some((header, &data[8..8 + take]))
}

/// Result of scanning a payload for `(UUID, value)` tuples.
#[derive(Debug, Default, Clone)]
pub struct ScanResult {
    pub tuples: Vec<(Uuid, f64)>,
    /// Number of offsets attempted (a rough "tuples scanned" metric, Design
    /// Notes §9: operators can detect firmware changes that break the
    /// heuristic by watching this ratio against `accepted`).
    pub scanned: u64,
    pub accepted: u64,
}

/// Whether a value falls into one of the three plausible bands (spec §4.5):
/// exactly 0 or 1, the "reasonable analog" range `0 ≤ |v| ≤ 1000`, or the
/// broader non-pathological range `1e-30 < |v| < 1e+30`.
fn is_plausible_value(v: f64) -> bool {
    if v.is_nan() {
        return false;
    }
    if v == 0.0 || v == 1.0 {
        return true;
    }
    if (0.0..=1000.0).contains(&v.abs()) {
        return true;
    }
    v.abs() > 1e-30 && v.abs() < 1e+30
}

/// Try to decode one 24-byte window as a `(UUID, f64)` tuple: 16 bytes of
/// UUID, 8 bytes of little-endian `f64`. Returns `None` if the UUID is
/// malformed or the value fails the plausibility check.
pub fn decode_tuple(window: &[u8]) -> Option<(Uuid, f64)> {
    if window.len() < 24 {
        return None;
    }
    let uuid = Uuid::from_slice(&window[0..16]).ok()?;
    // A canonical-form UUID string is always 36 characters; from_slice can
    // never produce anything else, but the check documents the spec's
    // invariant explicitly (spec §4.5).
    if uuid.hyphenated().to_string().len() != 36 {
        return None;
    }
    let value = f64::from_le_bytes(window[16..24].try_into().ok()?);
    is_plausible_value(value).then_some((uuid, value))
}

/// Pure, synchronous overlapping scan of an entire payload. Used directly
/// for unit/property tests and for payloads below the cooperative-yield
/// threshold.
pub fn scan_tuples(payload: &[u8]) -> ScanResult {
    let mut result = ScanResult::default();
    let mut offset = 0usize;
    while offset + 24 <= payload.len() {
        result.scanned += 1;
        match decode_tuple(&payload[offset..offset + 24]) {
            Some(tuple) => {
                result.tuples.push(tuple);
                result.accepted += 1;
                offset += 8;
            }
            None => offset += 1,
        }
    }
    result
}

/// Threshold above which the scan yields to the runtime periodically (spec
/// §5: "explicit yields in the overlapping-scan inner loop if a payload is
/// unusually large").
pub const COOPERATIVE_YIELD_THRESHOLD: usize = 64 * 1024;

/// Same algorithm as [`scan_tuples`], but yields to the Tokio runtime every
/// 64 KiB of progress when the payload exceeds that threshold, so a single
/// oversized frame cannot block the WebSocket read loop for more than ~1ms.
pub async fn scan_tuples_cooperative(payload: &[u8]) -> ScanResult {
    if payload.len() <= COOPERATIVE_YIELD_THRESHOLD {
        return scan_tuples(payload);
    }
    let mut result = ScanResult::default();
    let mut offset = 0usize;
    while offset + 24 <= payload.len() {
        result.scanned += 1;
        match decode_tuple(&payload[offset..offset + 24]) {
            Some(tuple) => {
                result.tuples.push(tuple);
                result.accepted += 1;
                offset += 8;
            }
            None => offset += 1,
        }
        if offset % COOPERATIVE_YIELD_THRESHOLD == 0 {
            tokio::task::yield_now().await;
        }
    }
    result
}
