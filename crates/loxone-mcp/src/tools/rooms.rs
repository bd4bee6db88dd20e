// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::normalize::{self, RoomResolution};
use crate::tools::{optional_str, require_str};

pub async fn list_rooms(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let rooms: Vec<Value> = catalogue
        .rooms
        .values()
        .map(|room| {
            let device_count = catalogue.by_room.get(&room.uuid).map(|v| v.len()).unwrap_or(0);
            json!({ "name": room.name, "device_count": device_count })
        })
        .collect();
    json!({ "rooms": rooms })
}

/// Resolve a free-form room query into an exact catalogue room name, or an
/// `{error, near_matches}` value matching [`loxone_core::LoxoneError::RoomNotFound`]'s shape.
pub(crate) fn resolve_room_or_error(room_names: &[&str], query: &str) -> Result<String, Value> {
    match normalize::resolve_rooms(room_names, query) {
        RoomResolution::Exact(room) => Ok(room),
        RoomResolution::Matches(candidates) => {
            Err(json!({ "error": format!("ambiguous room: {query}"), "near_matches": candidates }))
        }
        RoomResolution::None => {
            Err(json!({ "error": format!("room not found: {query}"), "near_matches": Vec::<String>::new() }))
        }
    }
}

pub async fn get_room_devices(ctx: &ToolContext, args: &Value) -> Value {
    let room_query = match require_str(args, "room") {
        Ok(r) => r,
        Err(e) => return e,
    };
    let device_type = optional_str(args, "device_type");

    let catalogue = ctx.client.catalogue().await;
    let room_names: Vec<&str> = catalogue.rooms.values().map(|r| r.name.as_str()).collect();
    let room = match resolve_room_or_error(&room_names, room_query) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let devices: Vec<Value> = catalogue
        .devices
        .values()
        .filter(|d| d.room_name == room)
        .filter(|d| match device_type {
            Some(t) => d.device_type.eq_ignore_ascii_case(t),
            None => true,
        })
        .map(|d| {
            json!({
                "uuid": d.uuid.to_string(),
                "name": d.name,
                "type": d.device_type,
                "category": d.category_name,
            })
        })
        .collect();

    json!({ "room": room, "devices": devices })
}
