// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Tool dispatch table (C10): one method per MCP tool name, each taking a
//! [`ToolContext`] and a JSON arguments object and returning a JSON value
//! that is either a success object or `{error: string, ...}` (spec §6, §7).
//! Every tool function is infallible at this boundary — internal errors are
//! folded into the returned JSON rather than propagated.

mod catalogue;
mod devices;
mod environment;
mod rooms;
mod scenes;
mod sensors;
mod state_log;
mod system;

use serde_json::{json, Value};

use crate::context::ToolContext;

/// Static catalogue of tool names and one-line descriptions, used for
/// `tools/list`. Input schemas are intentionally permissive objects; each
/// tool validates its own arguments and reports a descriptive `error` on
/// a bad call rather than rejecting at the schema layer.
pub fn tool_list() -> Vec<Value> {
    const TOOLS: &[(&str, &str)] = &[
        ("list_rooms", "List every room known to the structure catalogue."),
        ("get_room_devices", "List devices in a room, optionally filtered by device type."),
        ("control_device", "Send a generic control command to one device."),
        ("control_rolladen", "Move one or more blinds/shutters in a room."),
        ("control_light", "Switch or dim one or more lights in a room."),
        ("discover_all_devices", "List every device in the structure catalogue."),
        ("get_devices_by_category", "List devices in a structure category."),
        ("get_devices_by_type", "List devices of a given control type."),
        ("get_all_categories_overview", "Summarize device counts per category."),
        ("rediscover_sensors", "Watch live state updates and classify sensors by behavior."),
        ("list_discovered_sensors", "List sensors from the most recent discovery run."),
        ("get_sensor_details", "Details for one discovered sensor."),
        ("get_sensor_categories", "Describe the fixed sensor category taxonomy."),
        ("get_sensor_state_history", "Full recorded state-change history for one sensor."),
        ("get_recent_sensor_changes", "Most recent state changes across all sensors."),
        ("get_door_window_activity", "Door/window sensor activity over a trailing window."),
        ("get_logging_statistics", "Summary statistics for the state-change log."),
        ("get_weather_data", "Raw current values from weather-related sensors."),
        ("get_outdoor_conditions", "Outdoor temperature, humidity, and wind."),
        ("get_temperature_overview", "Current temperature readings, optionally by room."),
        ("get_humidity_overview", "Current humidity readings, optionally by room."),
        ("get_brightness_levels", "Current brightness sensor readings."),
        ("get_environmental_summary", "Combined temperature/humidity/brightness summary."),
        ("get_climate_summary", "Room climate controller summary."),
        ("get_climate_control", "Climate controller state for one room."),
        ("get_weather_service_status", "Whether a weather server device is present and live."),
        ("get_weather_current", "Current weather-server readings."),
        ("get_weather_forecast", "Forecast values exposed by the weather server, if any."),
        ("diagnose_weather_service", "Diagnostic detail for weather service unavailability."),
        ("get_lighting_presets", "Lighting moods/presets for a room's light controller."),
        ("set_lighting_mood", "Activate a lighting mood by id."),
        ("get_active_lighting_moods", "Currently active lighting moods across all controllers."),
        ("control_central_lighting", "Control a whole-house central lighting controller."),
        ("get_house_scenes", "List configured house scenes."),
        ("activate_house_scene", "Activate a house scene by type."),
        ("get_alarm_clocks", "List configured alarm clocks."),
        ("set_alarm_clock", "Enable or disable an alarm clock."),
        ("get_scene_status_overview", "Summary of scene/mood/alarm activation state."),
        ("get_available_capabilities", "Capability summary derived from the structure catalogue."),
        ("get_system_status", "Connection, token, and frame-scan health."),
        ("get_device_status", "Current state value(s) for one device by uuid."),
    ];
    TOOLS
        .iter()
        .map(|(name, description)| {
            json!({
                "name": name,
                "description": description,
                "inputSchema": { "type": "object" },
            })
        })
        .collect()
}

pub async fn dispatch(ctx: &ToolContext, name: &str, args: Value) -> Value {
    match name {
        "list_rooms" => rooms::list_rooms(ctx).await,
        "get_room_devices" => rooms::get_room_devices(ctx, &args).await,
        "control_device" => devices::control_device(ctx, &args).await,
        "control_rolladen" => devices::control_rolladen(ctx, &args).await,
        "control_light" => devices::control_light(ctx, &args).await,
        "discover_all_devices" => catalogue::discover_all_devices(ctx).await,
        "get_devices_by_category" => catalogue::get_devices_by_category(ctx, &args).await,
        "get_devices_by_type" => catalogue::get_devices_by_type(ctx, &args).await,
        "get_all_categories_overview" => catalogue::get_all_categories_overview(ctx).await,
        "rediscover_sensors" => sensors::rediscover_sensors(ctx, &args).await,
        "list_discovered_sensors" => sensors::list_discovered_sensors(ctx).await,
        "get_sensor_details" => sensors::get_sensor_details(ctx, &args).await,
        "get_sensor_categories" => sensors::get_sensor_categories(),
        "get_sensor_state_history" => state_log::get_sensor_state_history(ctx, &args).await,
        "get_recent_sensor_changes" => state_log::get_recent_sensor_changes(ctx, &args).await,
        "get_door_window_activity" => state_log::get_door_window_activity(ctx, &args).await,
        "get_logging_statistics" => state_log::get_logging_statistics(ctx).await,
        "get_weather_data" => environment::get_weather_data(ctx).await,
        "get_outdoor_conditions" => environment::get_outdoor_conditions(ctx).await,
        "get_temperature_overview" => environment::get_temperature_overview(ctx, &args).await,
        "get_humidity_overview" => environment::get_humidity_overview(ctx, &args).await,
        "get_brightness_levels" => environment::get_brightness_levels(ctx).await,
        "get_environmental_summary" => environment::get_environmental_summary(ctx).await,
        "get_climate_summary" => environment::get_climate_summary(ctx).await,
        "get_climate_control" => environment::get_climate_control(ctx, &args).await,
        "get_weather_service_status" => environment::get_weather_service_status(ctx).await,
        "get_weather_current" => environment::get_weather_current(ctx).await,
        "get_weather_forecast" => environment::get_weather_forecast(ctx).await,
        "diagnose_weather_service" => environment::diagnose_weather_service(ctx).await,
        "get_lighting_presets" => scenes::get_lighting_presets(ctx, &args).await,
        "set_lighting_mood" => scenes::set_lighting_mood(ctx, &args).await,
        "get_active_lighting_moods" => scenes::get_active_lighting_moods(ctx).await,
        "control_central_lighting" => scenes::control_central_lighting(ctx, &args).await,
        "get_house_scenes" => scenes::get_house_scenes(ctx).await,
        "activate_house_scene" => scenes::activate_house_scene(ctx, &args).await,
        "get_alarm_clocks" => scenes::get_alarm_clocks(ctx).await,
        "set_alarm_clock" => scenes::set_alarm_clock(ctx, &args).await,
        "get_scene_status_overview" => scenes::get_scene_status_overview(ctx).await,
        "get_available_capabilities" => system::get_available_capabilities(ctx).await,
        "get_system_status" => system::get_system_status(ctx).await,
        "get_device_status" => system::get_device_status(ctx, &args).await,
        other => json!({ "error": format!("unknown tool: {other}") }),
    }
}

/// Shared helper: pull a required string argument out of a JSON object,
/// returning a uniform `error` value when missing.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, Value> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| json!({ "error": format!("missing required argument: {key}") }))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub(crate) fn optional_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(|v| v.as_f64())
}

pub(crate) fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

pub(crate) fn optional_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}
