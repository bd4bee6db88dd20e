// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use std::time::Duration;

use loxone_core::discovery::DiscoveredSensor;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::ToolContext;
use crate::tools::{optional_u64, require_str};

fn sensor_json(s: &DiscoveredSensor) -> Value {
    json!({
        "uuid": s.uuid.to_string(),
        "category": s.category.as_str(),
        "score": s.score,
        "confidence": s.confidence,
        "sample_count": s.sample_count,
        "unique_values": s.unique_values,
    })
}

/// `rediscover_sensors(discovery_time?)` (spec §6, §8 scenario S5). Watches
/// live state updates for the requested window (default from config) and
/// replaces the cached discovery results.
pub async fn rediscover_sensors(ctx: &ToolContext, args: &Value) -> Value {
    let window_secs = optional_u64(args, "discovery_time")
        .unwrap_or(ctx.client.config.discovery_window_secs);
    let window = Duration::from_secs(window_secs);

    let sensors = ctx.client.discover_sensors(window).await;
    ctx.set_discovered_sensors(sensors.clone()).await;

    json!({
        "discovery_window_secs": window_secs,
        "sensors_found": sensors.len(),
        "sensors": sensors.iter().map(sensor_json).collect::<Vec<_>>(),
    })
}

pub async fn list_discovered_sensors(ctx: &ToolContext) -> Value {
    let sensors = ctx.discovered_sensors().await;
    json!({ "sensors_found": sensors.len(), "sensors": sensors.iter().map(sensor_json).collect::<Vec<_>>() })
}

pub async fn get_sensor_details(ctx: &ToolContext, args: &Value) -> Value {
    let uuid_str = match require_str(args, "uuid") {
        Ok(u) => u,
        Err(e) => return e,
    };
    let Ok(uuid) = uuid_str.parse::<Uuid>() else {
        return json!({ "error": format!("invalid uuid: {uuid_str}") });
    };

    let sensors = ctx.discovered_sensors().await;
    match sensors.iter().find(|s| s.uuid == uuid) {
        Some(sensor) => sensor_json(sensor),
        None => json!({ "error": format!("sensor not yet discovered: {uuid_str}") }),
    }
}

pub fn get_sensor_categories() -> Value {
    json!({
        "categories": [
            { "name": "door_window", "description": "Strictly binary, low-frequency, state-change driven sensors." },
            { "name": "motion", "description": "Strictly binary sensors with higher update frequency." },
            { "name": "analog", "description": "Continuously varying values within a bounded range." },
            { "name": "noisy", "description": "High-frequency sensors of any value shape." },
        ],
    })
}
