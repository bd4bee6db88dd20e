// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Normalization tables shared by every device-control tool: action
//! aliases, floor-prefix expansion, umlaut-folded room resolution, and
//! per-device-type command encoding.

/// Map a free-form action word (German or English) to one of the fixed
/// canonical verbs. Returns the canonical verb unchanged when given one
/// already, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_action(input: &str) -> Option<&'static str> {
    match input.to_lowercase().as_str() {
        "on" | "an" | "ein" | "einschalten" => Some("on"),
        "off" | "aus" | "ausschalten" => Some("off"),
        "up" | "hoch" | "auf" | "rauf" | "oeffnen" | "öffnen" | "open" => Some("up"),
        "down" | "runter" | "zu" | "schliessen" | "schließen" | "close" => Some("down"),
        "stop" | "halt" | "anhalten" | "stopp" => Some("stop"),
        "toggle" | "umschalten" | "wechseln" | "pulse" => Some("toggle"),
        "dim" | "dimmen" | "brightness" => Some("dim"),
        "position" | "pos" | "moveto" | "move_to" => Some("position"),
        _ => None,
    }
}

/// Expand a floor abbreviation (German building convention) to its fixed
/// prefix. `OG` = Obergeschoss (upper floor), `EG` = Erdgeschoss (ground
/// floor), `UG` = Untergeschoss (basement), `DG` = Dachgeschoss (attic).
pub fn floor_prefix(input: &str) -> Option<&'static str> {
    match input.to_lowercase().as_str() {
        "og" | "obergeschoss" | "upstairs" | "upper floor" => Some("OG"),
        "eg" | "erdgeschoss" | "ground floor" | "downstairs" => Some("EG"),
        "ug" | "untergeschoss" | "basement" => Some("UG"),
        "dg" | "dachgeschoss" | "attic" => Some("DG"),
        _ => None,
    }
}

/// Fold German umlauts and eszett to their ASCII digraph equivalents, for
/// loose substring room matching.
pub fn fold_umlauts(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ä' | 'Ä' => "ae".to_owned(),
            'ö' | 'Ö' => "oe".to_owned(),
            'ü' | 'Ü' => "ue".to_owned(),
            'ß' => "ss".to_owned(),
            other => other.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomResolution {
    Exact(String),
    Matches(Vec<String>),
    None,
}

/// Resolve a free-form room query against the catalogue's room names:
/// exact case-insensitive match first, then a floor-prefix expansion, then
/// a substring match after umlaut folding (spec §4.10).
pub fn resolve_rooms(room_names: &[&str], query: &str) -> RoomResolution {
    if let Some(exact) = room_names.iter().find(|r| r.eq_ignore_ascii_case(query)) {
        return RoomResolution::Exact((*exact).to_owned());
    }

    if let Some(prefix) = floor_prefix(query) {
        let matches: Vec<String> = room_names
            .iter()
            .filter(|r| r.to_uppercase().starts_with(prefix))
            .map(|r| (*r).to_owned())
            .collect();
        if !matches.is_empty() {
            return RoomResolution::Matches(matches);
        }
    }

    let folded_query = fold_umlauts(&query.to_lowercase());
    let matches: Vec<String> = room_names
        .iter()
        .filter(|r| fold_umlauts(&r.to_lowercase()).contains(&folded_query))
        .map(|r| (*r).to_owned())
        .collect();

    match matches.len() {
        0 => RoomResolution::None,
        1 => RoomResolution::Exact(matches.into_iter().next().expect("len checked")),
        _ => RoomResolution::Matches(matches),
    }
}

/// Jalousie (blind/shutter) command encoding (spec §4.10).
pub fn encode_jalousie_command(action: &str, position: Option<f64>) -> Option<String> {
    match action {
        "up" => Some("FullUp".to_owned()),
        "down" => Some("FullDown".to_owned()),
        "stop" => Some("Stop".to_owned()),
        "position" => position.map(|p| format!("moveToPosition/{p}")),
        _ => None,
    }
}

/// Light command encoding (spec §4.10).
pub fn encode_light_command(action: &str, brightness: Option<f64>) -> Option<String> {
    match action {
        "on" => Some("On".to_owned()),
        "off" => Some("Off".to_owned()),
        "toggle" => Some("Pulse".to_owned()),
        "dim" => brightness.map(|p| format!("{p}")),
        _ => None,
    }
}

/// Generic devices pass the canonical verb through unchanged.
pub fn encode_generic_command(action: &str) -> String {
    action.to_owned()
}
