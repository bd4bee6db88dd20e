// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use std::fmt;

/// Error taxonomy for the Loxone protocol adapter (see spec §7).
#[derive(Debug, Clone, PartialEq)]
pub enum LoxoneError {
    CredentialStore(String),
    Transport(String),
    Unauthorized,
    ProtocolUnsupported(String),
    Decode(String),
    DeviceNotFound(Vec<String>),
    RoomNotFound(Vec<String>),
    Timeout,
    CapabilityUnavailable(Vec<String>),
}

impl LoxoneError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialStore(_) => "CREDENTIAL_STORE",
            Self::Transport(_) => "TRANSPORT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ProtocolUnsupported(_) => "PROTOCOL_UNSUPPORTED",
            Self::Decode(_) => "DECODE",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
        }
    }

    /// Whether this error should terminate the owning session rather than
    /// be recovered inside the transport layer (spec §7 propagation policy).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolUnsupported(_))
    }

    /// Render as the `{error: string, ...}` shape every MCP tool result uses
    /// on failure (spec §7).
    pub fn to_tool_error(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("error".to_owned(), serde_json::Value::String(self.to_string()));
        match self {
            Self::DeviceNotFound(candidates) | Self::RoomNotFound(candidates) => {
                obj.insert(
                    "near_matches".to_owned(),
                    serde_json::Value::Array(
                        candidates.iter().cloned().map(serde_json::Value::String).collect(),
                    ),
                );
            }
            Self::CapabilityUnavailable(features) => {
                obj.insert(
                    "available_features".to_owned(),
                    serde_json::Value::Array(
                        features.iter().cloned().map(serde_json::Value::String).collect(),
                    ),
                );
            }
            _ => {}
        }
        serde_json::Value::Object(obj)
    }
}

impl fmt::Display for LoxoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialStore(msg) => write!(f, "credential store error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::ProtocolUnsupported(msg) => write!(f, "unsupported protocol: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::DeviceNotFound(candidates) => {
                write!(f, "device not found (near matches: {})", candidates.join(", "))
            }
            Self::RoomNotFound(candidates) => {
                write!(f, "room not found (near matches: {})", candidates.join(", "))
            }
            Self::Timeout => write!(f, "timeout"),
            Self::CapabilityUnavailable(features) => {
                write!(f, "capability unavailable (available: {})", features.join(", "))
            }
        }
    }
}

impl std::error::Error for LoxoneError {}
