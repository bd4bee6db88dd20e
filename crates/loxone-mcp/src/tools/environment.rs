// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use loxone_core::catalogue::Device;
use loxone_core::Value as LoxValue;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools::optional_str;

/// Read a device's primary reported state (`value`, falling back to
/// whichever single state ref it declares), resolving through the live
/// state mirror.
async fn current_reading(ctx: &ToolContext, device: &Device) -> Option<LoxValue> {
    let state_uuid_str = device.state_refs.get("value").or_else(|| device.state_refs.values().next())?;
    let uuid = state_uuid_str.parse().ok()?;
    ctx.client.state.get(&uuid).await
}

fn loxvalue_json(v: &LoxValue) -> Value {
    match v {
        LoxValue::Double(d) => json!(d),
        LoxValue::Bool(b) => json!(b),
        LoxValue::Text(s) => json!(s),
    }
}

fn devices_matching<'a>(devices: impl Iterator<Item = &'a Device>, types: &[&str], keywords: &[&str]) -> Vec<&'a Device> {
    devices
        .filter(|d| {
            types.iter().any(|t| t.eq_ignore_ascii_case(&d.device_type))
                || keywords.iter().any(|kw| d.name.to_lowercase().contains(kw))
        })
        .collect()
}

async fn readings_for(ctx: &ToolContext, devices: &[&Device]) -> Vec<Value> {
    let mut out = Vec::with_capacity(devices.len());
    for device in devices {
        let reading = current_reading(ctx, device).await;
        out.push(json!({
            "uuid": device.uuid.to_string(),
            "name": device.name,
            "room": device.room_name,
            "value": reading.as_ref().map(loxvalue_json),
        }));
    }
    out
}

const TEMPERATURE_TYPES: &[&str] = &["TemperatureSensor"];
const TEMPERATURE_KEYWORDS: &[&str] = &["temperature", "temperatur"];
const HUMIDITY_TYPES: &[&str] = &["HumiditySensor"];
const HUMIDITY_KEYWORDS: &[&str] = &["humidity", "feuchtigkeit"];
const BRIGHTNESS_KEYWORDS: &[&str] = &["brightness", "helligkeit", "lux"];
const WIND_TYPES: &[&str] = &["WindSensor"];
const WIND_KEYWORDS: &[&str] = &["wind"];

pub async fn get_weather_data(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let devices = devices_matching(
        catalogue.devices.values(),
        &[TEMPERATURE_TYPES, HUMIDITY_TYPES, WIND_TYPES].concat(),
        &[TEMPERATURE_KEYWORDS, HUMIDITY_KEYWORDS, WIND_KEYWORDS, BRIGHTNESS_KEYWORDS].concat(),
    );
    json!({ "readings": readings_for(ctx, &devices).await })
}

pub async fn get_outdoor_conditions(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let outdoor_keywords = ["outdoor", "aussen", "außen"];
    let devices: Vec<&Device> = catalogue
        .devices
        .values()
        .filter(|d| outdoor_keywords.iter().any(|kw| d.name.to_lowercase().contains(kw)))
        .collect();
    json!({ "conditions": readings_for(ctx, &devices).await })
}

pub async fn get_temperature_overview(ctx: &ToolContext, args: &Value) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let room = optional_str(args, "room");
    let mut devices = devices_matching(catalogue.devices.values(), TEMPERATURE_TYPES, TEMPERATURE_KEYWORDS);
    if let Some(room) = room {
        devices.retain(|d| d.room_name.eq_ignore_ascii_case(room));
    }
    json!({ "room": room, "temperatures": readings_for(ctx, &devices).await })
}

pub async fn get_humidity_overview(ctx: &ToolContext, args: &Value) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let room = optional_str(args, "room");
    let mut devices = devices_matching(catalogue.devices.values(), HUMIDITY_TYPES, HUMIDITY_KEYWORDS);
    if let Some(room) = room {
        devices.retain(|d| d.room_name.eq_ignore_ascii_case(room));
    }
    json!({ "room": room, "humidity": readings_for(ctx, &devices).await })
}

pub async fn get_brightness_levels(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let devices = devices_matching(catalogue.devices.values(), &[], BRIGHTNESS_KEYWORDS);
    json!({ "brightness": readings_for(ctx, &devices).await })
}

pub async fn get_environmental_summary(ctx: &ToolContext) -> Value {
    json!({
        "temperature": get_temperature_overview(ctx, &json!({})).await["temperatures"],
        "humidity": get_humidity_overview(ctx, &json!({})).await["humidity"],
        "brightness": get_brightness_levels(ctx).await["brightness"],
    })
}

const CLIMATE_TYPES: &[&str] = &["IRoomController", "Thermostat", "AirConditioning"];

pub async fn get_climate_summary(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let devices = devices_matching(catalogue.devices.values(), CLIMATE_TYPES, &["climate", "heating", "heizung"]);
    json!({ "controllers": readings_for(ctx, &devices).await })
}

pub async fn get_climate_control(ctx: &ToolContext, args: &Value) -> Value {
    let room_query = match crate::tools::require_str(args, "room") {
        Ok(r) => r,
        Err(e) => return e,
    };
    let catalogue = ctx.client.catalogue().await;
    let devices: Vec<&Device> = catalogue
        .devices
        .values()
        .filter(|d| d.room_name.eq_ignore_ascii_case(room_query) && CLIMATE_TYPES.contains(&d.device_type.as_str()))
        .collect();
    if devices.is_empty() {
        return json!({ "error": format!("no climate controller found in room: {room_query}") });
    }
    json!({ "room": room_query, "controllers": readings_for(ctx, &devices).await })
}

fn weather_server<'a>(catalogue: &'a loxone_core::catalogue::Catalogue) -> Option<&'a Device> {
    catalogue.devices.values().find(|d| d.device_type.eq_ignore_ascii_case("WeatherServer"))
}

pub async fn get_weather_service_status(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    match weather_server(&catalogue) {
        Some(device) => json!({ "available": true, "uuid": device.uuid.to_string(), "name": device.name }),
        None => json!({
            "error": "weather service unavailable",
            "available_features": catalogue_feature_list(&catalogue),
        }),
    }
}

pub async fn get_weather_current(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let Some(device) = weather_server(&catalogue) else {
        return json!({ "error": "weather service unavailable", "available_features": catalogue_feature_list(&catalogue) });
    };
    let readings = readings_for(ctx, std::slice::from_ref(&device)).await;
    json!({ "current": readings.into_iter().next().unwrap_or(Value::Null) })
}

pub async fn get_weather_forecast(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    match weather_server(&catalogue) {
        Some(device) => json!({ "forecast": device.details.get("forecast").cloned().unwrap_or(Value::Array(vec![])) }),
        None => json!({ "error": "weather service unavailable", "available_features": catalogue_feature_list(&catalogue) }),
    }
}

pub async fn diagnose_weather_service(ctx: &ToolContext) -> Value {
    let catalogue = ctx.client.catalogue().await;
    let present = weather_server(&catalogue).is_some();
    json!({
        "weather_server_present": present,
        "capabilities_weather": catalogue.capabilities.weather.has,
        "weather_device_count": catalogue.capabilities.weather.count,
    })
}

fn catalogue_feature_list(catalogue: &loxone_core::catalogue::Catalogue) -> Vec<&'static str> {
    let mut out = Vec::new();
    if catalogue.capabilities.lighting.has {
        out.push("lighting");
    }
    if catalogue.capabilities.blinds.has {
        out.push("blinds");
    }
    if catalogue.capabilities.security.has {
        out.push("security");
    }
    if catalogue.capabilities.energy.has {
        out.push("energy");
    }
    if catalogue.capabilities.audio.has {
        out.push("audio");
    }
    if catalogue.capabilities.climate.has {
        out.push("climate");
    }
    if catalogue.capabilities.sensors.has {
        out.push("sensors");
    }
    out
}
