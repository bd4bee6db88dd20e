// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::ToolContext;
use crate::tools::require_str;

pub async fn get_available_capabilities(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let c = &catalogue.capabilities;
    json!({
        "lighting": { "has": c.lighting.has, "count": c.lighting.count },
        "blinds": { "has": c.blinds.has, "count": c.blinds.count },
        "weather": { "has": c.weather.has, "count": c.weather.count },
        "security": { "has": c.security.has, "count": c.security.count },
        "energy": { "has": c.energy.has, "count": c.energy.count },
        "audio": { "has": c.audio.has, "count": c.audio.count },
        "climate": { "has": c.climate.has, "count": c.climate.count },
        "sensors": { "has": c.sensors.has, "count": c.sensors.count },
    })
}

/// `get_system_status()` surfaces connection health, token lifecycle state,
/// and WebSocket frame-scan counters alongside basic Miniserver identity.
pub async fn get_system_status(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let (tuples_scanned, tuples_accepted) = ctx.client.ws.scan_metrics();
    let token_state = ctx.client.token.state().await;

    json!({
        "miniserver": {
            "serial_number": catalogue.miniserver.serial_number,
            "project_name": catalogue.miniserver.project_name,
            "sw_version": catalogue.miniserver.sw_version,
            "location": catalogue.miniserver.location,
        },
        "device_count": catalogue.devices.len(),
        "token_state": format!("{token_state:?}"),
        "ws": {
            "tuples_scanned": tuples_scanned,
            "tuples_accepted": tuples_accepted,
        },
    })
}

pub async fn get_device_status(ctx: &ToolContext, args: &Value) -> Value {
    let uuid_str = match require_str(args, "device_uuid") {
        Ok(u) => u,
        Err(e) => return e,
    };
    let Ok(uuid) = uuid_str.parse::<Uuid>() else {
        return json!({ "error": format!("invalid uuid: {uuid_str}") });
    };

    let catalogue = ctx.client.catalogue().await;
    let Some(device) = catalogue.devices.get(&uuid) else {
        return json!({ "error": format!("device not found: {uuid_str}") });
    };

    let mut states = serde_json::Map::new();
    for (name, state_uuid_str) in &device.state_refs {
        let Ok(state_uuid) = state_uuid_str.parse::<Uuid>() else { continue };
        let value = ctx.client.state.get(&state_uuid).await;
        states.insert(
            name.clone(),
            match value {
                Some(loxone_core::Value::Double(d)) => json!(d),
                Some(loxone_core::Value::Bool(b)) => json!(b),
                Some(loxone_core::Value::Text(s)) => json!(s),
                None => Value::Null,
            },
        );
    }

    json!({
        "uuid": uuid_str,
        "name": device.name,
        "type": device.device_type,
        "room": device.room_name,
        "states": states,
    })
}
