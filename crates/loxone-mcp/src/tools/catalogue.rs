// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools::optional_str;

fn device_json(d: &loxone_core::catalogue::Device) -> Value {
    json!({
        "uuid": d.uuid.to_string(),
        "name": d.name,
        "type": d.device_type,
        "room": d.room_name,
        "category": d.category_name,
    })
}

pub async fn discover_all_devices(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let devices: Vec<Value> = catalogue.devices.values().map(device_json).collect();
    json!({ "count": devices.len(), "devices": devices })
}

pub async fn get_devices_by_category(ctx: &ToolContext, args: &Value) -> Value {
    let catalogue = ctx.client.catalogue().await;
    match optional_str(args, "category") {
        Some(category) => {
            let devices: Vec<Value> = catalogue
                .devices
                .values()
                .filter(|d| d.category_name.eq_ignore_ascii_case(category))
                .map(device_json)
                .collect();
            json!({ "category": category, "devices": devices })
        }
        None => {
            let mut categories: Vec<Value> = catalogue
                .by_category
                .iter()
                .map(|(name, uuids)| json!({ "category": name, "device_count": uuids.len() }))
                .collect();
            categories.sort_by(|a, b| a["category"].as_str().cmp(&b["category"].as_str()));
            json!({ "categories": categories })
        }
    }
}

pub async fn get_devices_by_type(ctx: &ToolContext, args: &Value) -> Value {
    let catalogue = ctx.client.catalogue().await;
    match optional_str(args, "device_type") {
        Some(device_type) => {
            let devices: Vec<Value> = catalogue
                .devices
                .values()
                .filter(|d| d.device_type.eq_ignore_ascii_case(device_type))
                .map(device_json)
                .collect();
            json!({ "device_type": device_type, "devices": devices })
        }
        None => {
            let mut types: Vec<Value> = catalogue
                .by_type
                .iter()
                .map(|(name, uuids)| json!({ "type": name, "device_count": uuids.len() }))
                .collect();
            types.sort_by(|a, b| a["type"].as_str().cmp(&b["type"].as_str()));
            json!({ "types": types })
        }
    }
}

pub async fn get_all_categories_overview(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let categories: Vec<Value> = catalogue
        .categories
        .values()
        .map(|c| {
            let count = catalogue
                .by_category
                .get(&c.name)
                .map(|v| v.len())
                .unwrap_or(0);
            json!({ "name": c.name, "device_count": count })
        })
        .collect();
    json!({ "categories": categories, "capabilities": {
        "lighting": catalogue.capabilities.lighting.has,
        "blinds": catalogue.capabilities.blinds.has,
        "weather": catalogue.capabilities.weather.has,
        "security": catalogue.capabilities.security.has,
        "energy": catalogue.capabilities.energy.has,
        "audio": catalogue.capabilities.audio.has,
        "climate": catalogue.capabilities.climate.has,
        "sensors": catalogue.capabilities.sensors.has,
    }})
}
