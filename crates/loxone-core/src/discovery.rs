// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Dynamic sensor discovery (C8): watch a window of live state updates and
//! classify each UUID into a sensor category by scoring its observed update
//! pattern against a fixed table of category criteria.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::state::StateMirror;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorCategory {
    DoorWindow,
    Motion,
    Analog,
    Noisy,
}

impl SensorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorCategory::DoorWindow => "door_window",
            SensorCategory::Motion => "motion",
            SensorCategory::Analog => "analog",
            SensorCategory::Noisy => "noisy",
        }
    }
}

struct CategoryCriteria {
    category: SensorCategory,
    binary_only: bool,
    max_updates: Option<usize>,
    min_activity: usize,
    value_range: Option<(f64, f64)>,
    stable_pattern: bool,
    require_change: bool,
    priority: u32,
}

/// The fixed category table, weights and bounds preserved exactly from the
/// original heuristic (spec §4.8).
const CATEGORIES: &[CategoryCriteria] = &[
    CategoryCriteria {
        category: SensorCategory::DoorWindow,
        binary_only: true,
        max_updates: Some(3),
        min_activity: 1,
        value_range: None,
        stable_pattern: true,
        require_change: true,
        priority: 10,
    },
    CategoryCriteria {
        category: SensorCategory::Motion,
        binary_only: true,
        max_updates: Some(100),
        min_activity: 5,
        value_range: None,
        stable_pattern: false,
        require_change: false,
        priority: 8,
    },
    CategoryCriteria {
        category: SensorCategory::Analog,
        binary_only: false,
        max_updates: None,
        min_activity: 1,
        value_range: Some((0.0, 1000.0)),
        stable_pattern: false,
        require_change: false,
        priority: 5,
    },
    CategoryCriteria {
        category: SensorCategory::Noisy,
        binary_only: false,
        max_updates: Some(1000),
        min_activity: 50,
        value_range: None,
        stable_pattern: false,
        require_change: false,
        priority: 1,
    },
];

#[derive(Debug, Default)]
struct Observation {
    values: Vec<f64>,
    unique_bits: HashSet<u64>,
}

impl Observation {
    fn record(&mut self, value: f64) {
        self.values.push(value);
        self.unique_bits.insert(value.to_bits());
    }

    fn is_strictly_binary(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0 || *v == 1.0)
    }

    fn update_count(&self) -> usize {
        self.values.len()
    }

    fn unique_count(&self) -> usize {
        self.unique_bits.len()
    }

    fn min_max(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in &self.values {
            min = min.min(*v);
            max = max.max(*v);
        }
        (min, max)
    }
}

/// A sensor identified during a discovery window.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    pub uuid: Uuid,
    pub category: SensorCategory,
    /// Normalized category-fit score in `[0, 1]`.
    pub score: f64,
    /// Pattern confidence in `[0, 1]`, independent of the winning category.
    pub confidence: f64,
    pub sample_count: usize,
    pub unique_values: usize,
}

/// Weighted category-fit score (spec §4.8). Hard-disqualifying criteria
/// (`binary_only`, `require_change`) return `0.0` outright rather than a
/// partial score, matching the original classifier's behavior.
fn category_score(obs: &Observation, criteria: &CategoryCriteria) -> f64 {
    let mut max_score = 0.0f64;
    let mut score = 0.0f64;

    if criteria.binary_only {
        if !obs.is_strictly_binary() {
            return 0.0;
        }
        max_score += 30.0;
        score += 30.0;
    }

    if criteria.require_change {
        if obs.unique_count() < 2 {
            return 0.0;
        }
        max_score += 25.0;
        score += 25.0;
    }

    if let Some(limit) = criteria.max_updates {
        max_score += 20.0;
        let count = obs.update_count();
        if count <= limit {
            score += 20.0;
        } else {
            let excess = (count - limit) as f64;
            score += (20.0 - excess * 10.0).max(0.0);
        }
    }

    max_score += 15.0;
    if obs.update_count() >= criteria.min_activity {
        score += 15.0;
    }

    if let Some((lo, hi)) = criteria.value_range {
        max_score += 10.0;
        let (min, max) = obs.min_max();
        if min >= lo && max <= hi {
            score += 10.0;
        }
    }

    if criteria.stable_pattern {
        max_score += 10.0;
        let unique = obs.unique_count();
        if unique == 2 {
            let has_zero = obs.values.iter().any(|v| *v == 0.0);
            let has_one = obs.values.iter().any(|v| *v == 1.0);
            if has_zero && has_one {
                score += 10.0;
            } else {
                score += 5.0;
            }
        }
    }

    if max_score <= 0.0 {
        0.0
    } else {
        score / max_score
    }
}

/// Pattern confidence independent of category fit: rewards strict binary
/// sensors, moderate update frequency, a tight observed value range, and a
/// constant recency bonus for having updated at all within the window.
fn pattern_score(obs: &Observation) -> f64 {
    let mut score = 0.0f64;
    if obs.is_strictly_binary() {
        score += 0.4;
    }
    score += (obs.update_count() as f64 / 10.0).min(1.0) * 0.3;

    let (min, max) = obs.min_max();
    let range = if min.is_finite() && max.is_finite() { max - min } else { 0.0 };
    score += (1.0 - (range / 1000.0).min(1.0)) * 0.2;

    if obs.update_count() > 0 {
        score += 0.1;
    }
    score.min(1.0)
}

fn classify(uuid: Uuid, obs: &Observation) -> Option<DiscoveredSensor> {
    if obs.update_count() == 0 {
        return None;
    }
    let best = CATEGORIES
        .iter()
        .map(|c| (c, category_score(obs, c)))
        .filter(|(_, score)| *score > 0.0)
        .max_by(|(ca, sa), (cb, sb)| {
            sa.partial_cmp(sb).unwrap_or(std::cmp::Ordering::Equal).then(ca.priority.cmp(&cb.priority))
        });

    best.map(|(criteria, score)| DiscoveredSensor {
        uuid,
        category: criteria.category,
        score,
        confidence: pattern_score(obs),
        sample_count: obs.update_count(),
        unique_values: obs.unique_count(),
    })
}

/// Watch `mirror` for `window` and return every UUID that updated at least
/// once, classified by category. Subscribes a forwarding closure to the
/// mirror for the duration of the call; the subscription is never removed
/// (the mirror has no unsubscribe primitive), but the channel's receiver is
/// dropped when this function returns, so further sends are harmless no-ops.
pub async fn discover(mirror: &StateMirror, window: Duration) -> Vec<DiscoveredSensor> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Uuid, Value)>();
    mirror
        .subscribe(Arc::new(move |uuid, _old, new| {
            let _ = tx.send((uuid, new));
        }))
        .await;

    let mut observations: HashMap<Uuid, Observation> = HashMap::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some((uuid, value))) => {
                if let Some(v) = value.as_f64() {
                    observations.entry(uuid).or_default().record(v);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    let mut result: Vec<DiscoveredSensor> =
        observations.iter().filter_map(|(uuid, obs)| classify(*uuid, obs)).collect();
    result.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    result
}
