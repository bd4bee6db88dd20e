// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use loxone_core::catalogue::Device;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools::devices::{control_command_path, run_command};
use crate::tools::{optional_bool, optional_str, require_str};

const LIGHT_CONTROLLER_TYPES: &[&str] = &["LightControllerV2", "LightController"];
const CENTRAL_LIGHT_TYPES: &[&str] = &["CentralLightController"];
const ALARM_CLOCK_TYPES: &[&str] = &["Alarm", "AlarmClock"];

fn moods_of(device: &Device) -> Vec<Value> {
    match device.details.get("moods").and_then(|m| m.as_array()) {
        Some(moods) => moods.clone(),
        None => Vec::new(),
    }
}

/// `get_lighting_presets(room?)` lists the moods configured on each light
/// controller, taken from the structure file's `details.moods` array.
pub async fn get_lighting_presets(ctx: &ToolContext, args: &Value) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let room = optional_str(args, "room");
    let controllers: Vec<Value> = catalogue
        .devices
        .values()
        .filter(|d| LIGHT_CONTROLLER_TYPES.contains(&d.device_type.as_str()))
        .filter(|d| room.is_none() || room.map(|r| d.room_name.eq_ignore_ascii_case(r)).unwrap_or(true))
        .map(|d| json!({ "uuid": d.uuid.to_string(), "name": d.name, "room": d.room_name, "moods": moods_of(d) }))
        .collect();
    json!({ "room": room, "controllers": controllers })
}

pub async fn set_lighting_mood(ctx: &ToolContext, args: &Value) -> Value {
    let room_query = match require_str(args, "room") {
        Ok(r) => r,
        Err(e) => return e,
    };
    let mood_id = match require_str(args, "mood_id") {
        Ok(m) => m,
        Err(e) => return e,
    };

    let catalogue = ctx.client.catalogue().await;
    let Some(controller) = catalogue
        .devices
        .values()
        .find(|d| LIGHT_CONTROLLER_TYPES.contains(&d.device_type.as_str()) && d.room_name.eq_ignore_ascii_case(room_query))
    else {
        return json!({ "error": format!("no light controller found in room: {room_query}") });
    };

    let command = format!("changeTo/{mood_id}");
    match run_command(ctx, &controller.uuid.to_string(), &command).await {
        Ok(()) => json!({ "room": room_query, "controller": controller.name, "mood_id": mood_id, "success": true }),
        Err(e) => json!({ "room": room_query, "controller": controller.name, "mood_id": mood_id, "success": false, "error": e }),
    }
}

pub async fn get_active_lighting_moods(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let mut active = Vec::new();
    for device in catalogue.devices.values() {
        if !LIGHT_CONTROLLER_TYPES.contains(&device.device_type.as_str()) {
            continue;
        }
        let Some(state_uuid_str) = device.state_refs.get("activeMoods") else { continue };
        let Ok(state_uuid) = state_uuid_str.parse() else { continue };
        if let Some(value) = ctx.client.state.get(&state_uuid).await {
            active.push(json!({
                "uuid": device.uuid.to_string(),
                "name": device.name,
                "room": device.room_name,
                "active_moods": loxone_core::value::human_readable(&value),
            }));
        }
    }
    json!({ "active": active })
}

pub async fn control_central_lighting(ctx: &ToolContext, args: &Value) -> Value {
    let action = match require_str(args, "action") {
        Ok(a) => a,
        Err(e) => return e,
    };
    let mood_id = optional_str(args, "mood_id");

    let catalogue = ctx.client.catalogue().await;
    let Some(controller) = catalogue.devices.values().find(|d| CENTRAL_LIGHT_TYPES.contains(&d.device_type.as_str())) else {
        return json!({ "error": "no central lighting controller configured" });
    };

    let command = match (action, mood_id) {
        ("mood", Some(id)) => format!("changeTo/{id}"),
        _ => control_command_path(action),
    };

    match run_command(ctx, &controller.uuid.to_string(), &command).await {
        Ok(()) => json!({ "controller": controller.name, "action": action, "success": true }),
        Err(e) => json!({ "controller": controller.name, "action": action, "success": false, "error": e }),
    }
}

const SCENE_KEYWORDS: &[&str] = &["scene", "szene"];

pub async fn get_house_scenes(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let scenes: Vec<Value> = catalogue
        .devices
        .values()
        .filter(|d| SCENE_KEYWORDS.iter().any(|kw| d.name.to_lowercase().contains(kw)))
        .map(|d| json!({ "uuid": d.uuid.to_string(), "name": d.name, "room": d.room_name }))
        .collect();
    json!({ "scenes": scenes })
}

pub async fn activate_house_scene(ctx: &ToolContext, args: &Value) -> Value {
    let scene_type = match require_str(args, "scene_type") {
        Ok(s) => s,
        Err(e) => return e,
    };
    let action = optional_str(args, "action").unwrap_or("on");

    let catalogue = ctx.client.catalogue().await;
    let Some(scene) = catalogue
        .devices
        .values()
        .find(|d| SCENE_KEYWORDS.iter().any(|kw| d.name.to_lowercase().contains(kw)) && d.name.to_lowercase().contains(&scene_type.to_lowercase()))
    else {
        return json!({ "error": format!("no house scene matching: {scene_type}") });
    };

    let command = control_command_path(action);
    match run_command(ctx, &scene.uuid.to_string(), &command).await {
        Ok(()) => json!({ "scene": scene.name, "action": action, "success": true }),
        Err(e) => json!({ "scene": scene.name, "action": action, "success": false, "error": e }),
    }
}

pub async fn get_alarm_clocks(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let alarms: Vec<Value> = catalogue
        .devices
        .values()
        .filter(|d| ALARM_CLOCK_TYPES.contains(&d.device_type.as_str()))
        .map(|d| json!({ "uuid": d.uuid.to_string(), "name": d.name, "room": d.room_name }))
        .collect();
    json!({ "alarm_clocks": alarms })
}

pub async fn set_alarm_clock(ctx: &ToolContext, args: &Value) -> Value {
    let alarm_name = match require_str(args, "alarm_name") {
        Ok(a) => a,
        Err(e) => return e,
    };
    let enabled = match optional_bool(args, "enabled") {
        Some(e) => e,
        None => return json!({ "error": "missing required argument: enabled" }),
    };

    let catalogue = ctx.client.catalogue().await;
    let Some(alarm) = catalogue
        .devices
        .values()
        .find(|d| ALARM_CLOCK_TYPES.contains(&d.device_type.as_str()) && d.name.eq_ignore_ascii_case(alarm_name))
    else {
        return json!({ "error": format!("alarm clock not found: {alarm_name}") });
    };

    let command = if enabled { "enable" } else { "disable" };
    match run_command(ctx, &alarm.uuid.to_string(), command).await {
        Ok(()) => json!({ "alarm_name": alarm.name, "enabled": enabled, "success": true }),
        Err(e) => json!({ "alarm_name": alarm.name, "enabled": enabled, "success": false, "error": e }),
    }
}

pub async fn get_scene_status_overview(ctx: &ToolContext) -> Value {
    json!({
        "lighting_moods": get_active_lighting_moods(ctx).await["active"],
        "house_scenes": get_house_scenes(ctx).await["scenes"],
        "alarm_clocks": get_alarm_clocks(ctx).await["alarm_clocks"],
    })
}
