// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use loxone_core::catalogue::Device;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::normalize;
use crate::tools::rooms::resolve_room_or_error;
use crate::tools::{optional_f64, optional_str, require_str};

const JALOUSIE_TYPES: &[&str] = &["Jalousie", "Blind", "Shutter"];
const LIGHT_TYPES: &[&str] = &["LightController", "Dimmer", "Switch"];

fn find_device<'a>(devices: &'a [&'a Device], query: &str) -> Option<&'a Device> {
    let query_lower = query.to_lowercase();
    devices
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(query))
        .or_else(|| devices.iter().find(|d| d.name.to_lowercase().contains(&query_lower)))
        .copied()
}

pub(crate) async fn run_command(ctx: &ToolContext, uuid: &str, command: &str) -> Result<(), String> {
    let path = format!("jdev/sps/io/{uuid}/{command}");
    ctx.client.send_command(&path).await.map(|_| ()).map_err(|e| e.to_string())
}

/// Passthrough command encoding for controls with no dedicated alias table
/// (scene switches, central lighting, alarm clocks): just the normalized verb.
pub(crate) fn control_command_path(action: &str) -> String {
    normalize::normalize_action(action)
        .map(normalize::encode_generic_command)
        .unwrap_or_else(|| action.to_owned())
}

/// `control_device(device, action, room?)` (spec §6, §8 scenario S1/S2).
pub async fn control_device(ctx: &ToolContext, args: &Value) -> Value {
    let device_query = match require_str(args, "device") {
        Ok(d) => d,
        Err(e) => return e,
    };
    let action = match require_str(args, "action") {
        Ok(a) => a,
        Err(e) => return e,
    };
    let room_query = optional_str(args, "room");

    let catalogue = ctx.client.catalogue().await;
    let candidates: Vec<&Device> = catalogue
        .devices
        .values()
        .filter(|d| match room_query {
            Some(room) => d.room_name.eq_ignore_ascii_case(room),
            None => true,
        })
        .collect();

    let Some(device) = find_device(&candidates, device_query) else {
        return json!({ "error": format!("device not found: {device_query}"), "near_matches": Vec::<String>::new() });
    };

    let Some(canonical) = normalize::normalize_action(action) else {
        return json!({ "results": [{ "device": device.name, "error": format!("Invalid action: {action}") }] });
    };

    let command = normalize::encode_generic_command(canonical);
    match run_command(ctx, &device.uuid.to_string(), &command).await {
        Ok(()) => json!({
            "device": device.name,
            "controlled": 1,
            "results": [{ "device": device.name, "action": canonical, "success": true }],
        }),
        Err(e) => json!({
            "device": device.name,
            "controlled": 0,
            "results": [{ "device": device.name, "action": canonical, "success": false, "error": e }],
        }),
    }
}

/// `control_rolladen(room, device?, action, position?)` (spec §8 scenario S1/S2).
pub async fn control_rolladen(ctx: &ToolContext, args: &Value) -> Value {
    control_typed(ctx, args, JALOUSIE_TYPES, |action, position| {
        normalize::encode_jalousie_command(action, position)
    })
    .await
}

/// `control_light(room, device?, action, brightness?)`.
pub async fn control_light(ctx: &ToolContext, args: &Value) -> Value {
    control_typed(ctx, args, LIGHT_TYPES, |action, brightness| {
        normalize::encode_light_command(action, brightness)
    })
    .await
}

async fn control_typed(
    ctx: &ToolContext,
    args: &Value,
    types: &[&str],
    encode: impl Fn(&str, Option<f64>) -> Option<String>,
) -> Value {
    let room_query = match require_str(args, "room") {
        Ok(r) => r,
        Err(e) => return e,
    };
    let action = match require_str(args, "action") {
        Ok(a) => a,
        Err(e) => return e,
    };
    let device_query = optional_str(args, "device");
    let numeric_arg = optional_f64(args, "position").or_else(|| optional_f64(args, "brightness"));

    let catalogue = ctx.client.catalogue().await;
    let room_names: Vec<&str> = catalogue.rooms.values().map(|r| r.name.as_str()).collect();
    let room = match resolve_room_or_error(&room_names, room_query) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let mut targets: Vec<&Device> = catalogue
        .devices
        .values()
        .filter(|d| d.room_name == room && types.contains(&d.device_type.as_str()))
        .collect();
    if let Some(device_query) = device_query {
        targets.retain(|d| d.name.to_lowercase().contains(&device_query.to_lowercase()));
    }

    if targets.is_empty() {
        return json!({ "room": room, "controlled": 0, "results": [] });
    }

    let Some(canonical) = normalize::normalize_action(action) else {
        let results: Vec<Value> = targets
            .iter()
            .map(|d| json!({ "device": d.name, "error": format!("Invalid action: {action}") }))
            .collect();
        return json!({ "room": room, "results": results });
    };

    let Some(command) = encode(canonical, numeric_arg) else {
        let results: Vec<Value> = targets
            .iter()
            .map(|d| json!({ "device": d.name, "error": format!("action {canonical} requires a value") }))
            .collect();
        return json!({ "room": room, "results": results });
    };

    let mut results = Vec::with_capacity(targets.len());
    let mut controlled = 0usize;
    for device in &targets {
        match run_command(ctx, &device.uuid.to_string(), &command).await {
            Ok(()) => {
                controlled += 1;
                results.push(json!({ "device": device.name, "action": canonical, "success": true }));
            }
            Err(e) => {
                results.push(json!({ "device": device.name, "action": canonical, "success": false, "error": e }));
            }
        }
    }

    json!({ "room": room, "controlled": controlled, "results": results })
}
