// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Structure catalogue (C7): loads `LoxAPP3.json` once, builds the
//! `by_room`/`by_type`/`by_category` indices, and derives the capability
//! summary deterministically (spec §4.7).

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::LoxoneError;
use crate::http::LoxoneHttpClient;
use crate::token::TokenManager;

#[derive(Debug, Clone)]
pub struct Room {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub uuid: Uuid,
    pub name: String,
    pub device_type: String,
    pub room_uuid: Option<Uuid>,
    pub room_name: String,
    pub category_uuid: Option<Uuid>,
    pub category_name: String,
    pub state_refs: IndexMap<String, String>,
    pub details: serde_json::Value,
}

/// Miniserver identification, folded in from both the reachability probe
/// (`snr`) and the structure file's `msInfo` block (spec §2 supplement;
/// spec §6 lists the `msInfo` keys).
#[derive(Debug, Clone, Default)]
pub struct MiniserverInfo {
    pub serial_number: Option<String>,
    pub project_name: Option<String>,
    pub sw_version: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityCount {
    pub has: bool,
    pub count: usize,
}

impl CapabilityCount {
    fn from_count(count: usize) -> Self {
        Self { has: count > 0, count }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub lighting: CapabilityCount,
    pub blinds: CapabilityCount,
    pub weather: CapabilityCount,
    pub security: CapabilityCount,
    pub energy: CapabilityCount,
    pub audio: CapabilityCount,
    pub climate: CapabilityCount,
    pub sensors: CapabilityCount,
}

struct CapabilityDomain {
    types: &'static [&'static str],
    categories: &'static [&'static str],
    keywords: &'static [&'static str],
}

const LIGHTING: CapabilityDomain = CapabilityDomain {
    types: &["LightController", "Dimmer", "Switch"],
    categories: &["lights"],
    keywords: &["light", "licht", "lamp"],
};
const BLINDS: CapabilityDomain = CapabilityDomain {
    types: &["Jalousie", "Blind", "Shutter"],
    categories: &["shading"],
    keywords: &["blind", "rolladen", "jalousie", "shutter"],
};
const WEATHER: CapabilityDomain = CapabilityDomain {
    types: &["WeatherServer", "TemperatureSensor", "HumiditySensor", "WindSensor"],
    categories: &["weather"],
    keywords: &["weather", "wetter"],
};
const SECURITY: CapabilityDomain = CapabilityDomain {
    types: &["Alarm", "SmokeAlarm", "PresenceDetector"],
    categories: &["security"],
    keywords: &["alarm", "security", "sicherheit"],
};
const ENERGY: CapabilityDomain = CapabilityDomain {
    types: &["PowerMeter", "EnergyManager"],
    categories: &["energy"],
    keywords: &["energy", "power", "strom"],
};
const AUDIO: CapabilityDomain = CapabilityDomain {
    types: &["AudioZone", "MediaPlayer"],
    categories: &["audio", "multimedia"],
    keywords: &["audio", "music", "sound"],
};
const CLIMATE: CapabilityDomain = CapabilityDomain {
    types: &["IRoomController", "Thermostat", "AirConditioning"],
    categories: &["climate", "heating"],
    keywords: &["climate", "heating", "heizung", "temperature"],
};
const SENSORS: CapabilityDomain = CapabilityDomain {
    types: &["InfoOnlyAnalog", "InfoOnlyDigital", "Sensor"],
    categories: &["sensors"],
    keywords: &["sensor", "kontakt", "fenster", "tur", "tuer", "window", "door"],
};

fn count_domain(devices: &IndexMap<Uuid, Device>, domain: &CapabilityDomain) -> CapabilityCount {
    let mut counted: HashSet<Uuid> = HashSet::new();
    for device in devices.values() {
        if domain.types.contains(&device.device_type.as_str()) {
            counted.insert(device.uuid);
        }
    }
    for device in devices.values() {
        if counted.contains(&device.uuid) {
            continue;
        }
        if domain.categories.iter().any(|c| c.eq_ignore_ascii_case(&device.category_name)) {
            counted.insert(device.uuid);
        }
    }
    for device in devices.values() {
        if counted.contains(&device.uuid) {
            continue;
        }
        let name_lower = device.name.to_lowercase();
        if domain.keywords.iter().any(|kw| name_lower.contains(kw)) {
            counted.insert(device.uuid);
        }
    }
    CapabilityCount::from_count(counted.len())
}

fn derive_capabilities(devices: &IndexMap<Uuid, Device>) -> Capabilities {
    Capabilities {
        lighting: count_domain(devices, &LIGHTING),
        blinds: count_domain(devices, &BLINDS),
        weather: count_domain(devices, &WEATHER),
        security: count_domain(devices, &SECURITY),
        energy: count_domain(devices, &ENERGY),
        audio: count_domain(devices, &AUDIO),
        climate: count_domain(devices, &CLIMATE),
        sensors: count_domain(devices, &SENSORS),
    }
}

#[derive(Debug, Clone)]
pub struct Catalogue {
    pub rooms: IndexMap<Uuid, Room>,
    pub categories: IndexMap<Uuid, Category>,
    pub devices: IndexMap<Uuid, Device>,
    pub by_room: IndexMap<Uuid, Vec<Uuid>>,
    pub by_type: IndexMap<String, Vec<Uuid>>,
    pub by_category: IndexMap<String, Vec<Uuid>>,
    pub capabilities: Capabilities,
    pub miniserver: MiniserverInfo,
}

#[derive(Deserialize)]
struct RawRoom {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RawCategory {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RawControl {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    device_type: String,
    #[serde(default)]
    room: Option<String>,
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    states: IndexMap<String, String>,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct RawMsInfo {
    #[serde(default, rename = "projectName")]
    project_name: Option<String>,
    #[serde(default, rename = "swVersion")]
    sw_version: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct RawStructure {
    #[serde(default)]
    rooms: IndexMap<String, RawRoom>,
    #[serde(default)]
    cats: IndexMap<String, RawCategory>,
    #[serde(default)]
    controls: IndexMap<String, RawControl>,
    #[serde(default, rename = "msInfo")]
    ms_info: RawMsInfo,
}

impl Catalogue {
    /// Fetch `/data/LoxAPP3.json` (token-authenticated) and build the full
    /// catalogue: rooms, categories, devices, the three indices, and the
    /// capability summary (spec §4.7). `serial_number` comes from the
    /// reachability probe (`GET /jdev/cfg/apiKey`) performed during token
    /// acquisition (spec §2 supplement).
    pub async fn load(
        http: &LoxoneHttpClient,
        token: &TokenManager,
        serial_number: Option<String>,
    ) -> Result<Self, LoxoneError> {
        let raw_value = http.send(token, "data/LoxAPP3.json", true).await?;
        let raw: RawStructure =
            serde_json::from_value(raw_value).map_err(|e| LoxoneError::Decode(e.to_string()))?;
        Ok(Self::from_raw(raw, serial_number))
    }

    fn from_raw(raw: RawStructure, serial_number: Option<String>) -> Self {
        let mut rooms: IndexMap<Uuid, Room> = IndexMap::new();
        for (uuid_str, room) in raw.rooms {
            if let Ok(uuid) = uuid_str.parse() {
                rooms.insert(uuid, Room { uuid, name: room.name });
            }
        }

        let mut categories: IndexMap<Uuid, Category> = IndexMap::new();
        for (uuid_str, cat) in raw.cats {
            if let Ok(uuid) = uuid_str.parse() {
                categories.insert(uuid, Category { uuid, name: cat.name });
            }
        }

        let mut devices: IndexMap<Uuid, Device> = IndexMap::new();
        for (uuid_str, control) in raw.controls {
            let Ok(uuid) = uuid_str.parse::<Uuid>() else { continue };
            let room_uuid = control.room.as_deref().and_then(|r| r.parse().ok());
            let room_name = room_uuid
                .and_then(|r| rooms.get(&r))
                .map(|r| r.name.clone())
                .unwrap_or_else(|| "Unknown".to_owned());
            let category_uuid = control.cat.as_deref().and_then(|c| c.parse().ok());
            let category_name = category_uuid
                .and_then(|c| categories.get(&c))
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "Uncategorized".to_owned());

            devices.insert(
                uuid,
                Device {
                    uuid,
                    name: control.name,
                    device_type: control.device_type,
                    room_uuid,
                    room_name,
                    category_uuid,
                    category_name,
                    state_refs: control.states,
                    details: control.details,
                },
            );
        }

        let mut by_room: IndexMap<Uuid, Vec<Uuid>> = IndexMap::new();
        let mut by_type: IndexMap<String, Vec<Uuid>> = IndexMap::new();
        let mut by_category: IndexMap<String, Vec<Uuid>> = IndexMap::new();
        for device in devices.values() {
            if let Some(room_uuid) = device.room_uuid {
                by_room.entry(room_uuid).or_default().push(device.uuid);
            }
            by_type.entry(device.device_type.clone()).or_default().push(device.uuid);
            by_category.entry(device.category_name.clone()).or_default().push(device.uuid);
        }

        let capabilities = derive_capabilities(&devices);

        let miniserver = MiniserverInfo {
            serial_number,
            project_name: raw.ms_info.project_name,
            sw_version: raw.ms_info.sw_version,
            location: raw.ms_info.location,
        };

        Self { rooms, categories, devices, by_room, by_type, by_category, capabilities, miniserver }
    }
}
