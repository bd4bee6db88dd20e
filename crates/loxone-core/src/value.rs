// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Tagged sum type for Miniserver values (spec §9: "dynamic typing to typed
//! sum types"). The state mirror, the state-change log, and the sensor
//! classifier all speak this type rather than raw JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Double(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Double(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => match s.parse::<f64>() {
                Ok(f) => Value::Double(f),
                Err(_) => Value::Text(s.clone()),
            },
            other => Value::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(_) => None,
        }
    }

    pub fn is_strictly_binary(&self) -> bool {
        matches!(self.as_f64(), Some(v) if v == 0.0 || v == 1.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Human-readable label per spec §4.9: `0 -> "OPEN"`, `1 -> "CLOSED"`,
/// other strings uppercased, everything else `VALUE(v)`.
pub fn human_readable(value: &Value) -> String {
    match value {
        Value::Double(v) if *v == 0.0 => "OPEN".to_owned(),
        Value::Double(v) if *v == 1.0 => "CLOSED".to_owned(),
        Value::Bool(false) => "OPEN".to_owned(),
        Value::Bool(true) => "CLOSED".to_owned(),
        Value::Text(s) => s.to_uppercase(),
        other => format!("VALUE({other})"),
    }
}
