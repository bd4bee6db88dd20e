// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use loxone_core::sensor_log::StateChangeEvent;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::ToolContext;
use crate::tools::{optional_u64, require_str};

fn event_json(event: &StateChangeEvent) -> Value {
    json!({
        "timestamp_unix": event.timestamp_unix,
        "old_value": event.old_value,
        "new_value": event.new_value,
        "human_readable": event.human_readable,
    })
}

pub async fn get_sensor_state_history(ctx: &ToolContext, args: &Value) -> Value {
    let uuid_str = match require_str(args, "uuid") {
        Ok(u) => u,
        Err(e) => return e,
    };
    let Ok(uuid) = uuid_str.parse::<Uuid>() else {
        return json!({ "error": format!("invalid uuid: {uuid_str}") });
    };

    match ctx.client.sensor_log.get_sensor_history(&uuid).await {
        Some(events) => json!({
            "uuid": uuid_str,
            "event_count": events.len(),
            "events": events.iter().map(event_json).collect::<Vec<_>>(),
        }),
        None => json!({ "uuid": uuid_str, "event_count": 0, "events": [] }),
    }
}

pub async fn get_recent_sensor_changes(ctx: &ToolContext, args: &Value) -> Value {
    let limit = optional_u64(args, "limit").unwrap_or(20) as usize;
    let changes = ctx.client.sensor_log.get_recent_changes(limit).await;
    json!({
        "changes": changes
            .iter()
            .map(|(uuid, event)| {
                let mut v = event_json(event);
                v["uuid"] = json!(uuid.to_string());
                v
            })
            .collect::<Vec<_>>(),
    })
}

/// `get_door_window_activity(hours?)` — restricted to sensors the most
/// recent discovery run classified as `door_window` (spec §6).
pub async fn get_door_window_activity(ctx: &ToolContext, args: &Value) -> Value {
    let hours = args.get("hours").and_then(|v| v.as_i64()).unwrap_or(24);

    let door_window_uuids: Vec<Uuid> = ctx
        .discovered_sensors()
        .await
        .iter()
        .filter(|s| s.category.as_str() == "door_window")
        .map(|s| s.uuid)
        .collect();

    if door_window_uuids.is_empty() {
        return json!({
            "error": "no door/window sensors discovered yet; call rediscover_sensors first",
            "hours": hours,
        });
    }

    let activity = ctx.client.sensor_log.get_door_window_activity(&door_window_uuids, hours).await;
    json!({
        "hours": hours,
        "timeline": activity
            .timeline
            .iter()
            .map(|(uuid, event)| {
                let mut v = event_json(event);
                v["uuid"] = json!(uuid.to_string());
                v
            })
            .collect::<Vec<_>>(),
        "sensor_activity": activity
            .sensor_activity
            .iter()
            .map(|(uuid, count)| json!({ "uuid": uuid.to_string(), "change_count": count }))
            .collect::<Vec<_>>(),
    })
}

pub async fn get_logging_statistics(ctx: &ToolContext) -> Value {
    let stats = ctx.client.sensor_log.get_statistics().await;
    json!({
        "sensors_tracked": stats.sensors_tracked,
        "total_events": stats.total_events,
        "oldest_event_unix": stats.oldest_event_unix,
        "newest_event_unix": stats.newest_event_unix,
        "most_active_sensor": stats.most_active_sensor.map(|(uuid, count)| json!({
            "uuid": uuid.to_string(),
            "event_count": count,
        })),
    })
}
