// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! State-change log (C9): a bounded ring buffer per sensor UUID, persisted
//! to disk atomically and reloaded on startup.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::epoch::now_unix;
use crate::error::LoxoneError;
use crate::value::{human_readable, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub timestamp_unix: i64,
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub human_readable: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SensorHistory {
    events: VecDeque<StateChangeEvent>,
    last_updated: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLog {
    session_start: i64,
    last_persisted: i64,
    sensor_histories: IndexMap<Uuid, SensorHistory>,
}

pub struct SensorStatistics {
    pub sensors_tracked: usize,
    pub total_events: usize,
    pub oldest_event_unix: Option<i64>,
    pub newest_event_unix: Option<i64>,
    pub most_active_sensor: Option<(Uuid, usize)>,
}

pub struct DoorWindowActivity {
    /// Most recent changes across all door/window sensors, newest first,
    /// capped at 20 entries (spec §4.9).
    pub timeline: Vec<(Uuid, StateChangeEvent)>,
    pub sensor_activity: IndexMap<Uuid, usize>,
}

struct LogInner {
    histories: IndexMap<Uuid, SensorHistory>,
    last_persisted: i64,
}

/// Bounded, persisted history of every sensor state change (spec §4.9).
pub struct SensorStateLog {
    log_path: PathBuf,
    max_events_per_sensor: usize,
    max_sensors: usize,
    sync_interval: Duration,
    session_start: i64,
    /// Set by `log_state_change`, cleared by `persist_logs` (spec §4.9: "if
    /// dirty, serialize"). Kept outside `inner` like `http.rs`'s `broken`
    /// flag, since it's read-modified independently of the lock held for
    /// the history map itself.
    dirty: AtomicBool,
    inner: RwLock<LogInner>,
}

impl SensorStateLog {
    /// Load any existing log file (malformed entries are dropped with a
    /// warning, total sensors capped at `max_sensors`) and start a fresh
    /// session.
    pub async fn load(
        log_path: PathBuf,
        max_events_per_sensor: usize,
        max_sensors: usize,
        sync_interval: Duration,
    ) -> Result<Self, LoxoneError> {
        let mut histories: IndexMap<Uuid, SensorHistory> = IndexMap::new();

        if let Ok(bytes) = tokio::fs::read(&log_path).await {
            match serde_json::from_slice::<PersistedLog>(&bytes) {
                Ok(persisted) => {
                    for (uuid, mut history) in persisted.sensor_histories {
                        if histories.len() >= max_sensors {
                            break;
                        }
                        while history.events.len() > max_events_per_sensor {
                            history.events.pop_front();
                        }
                        histories.insert(uuid, history);
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, path = %log_path.display(), "existing sensor log is malformed, starting fresh");
                }
            }
        }

        Ok(Self {
            log_path,
            max_events_per_sensor,
            max_sensors,
            sync_interval,
            session_start: now_unix(),
            dirty: AtomicBool::new(false),
            inner: RwLock::new(LogInner { histories, last_persisted: 0 }),
        })
    }

    /// Record one state change, evicting the least-recently-updated sensor
    /// if this introduces a new UUID beyond `max_sensors` (spec §4.9: "LRU
    /// eviction").
    pub async fn log_state_change(&self, uuid: Uuid, old: Option<Value>, new: Value) {
        let now = now_unix();
        let event = StateChangeEvent {
            timestamp_unix: now,
            old_value: old,
            human_readable: human_readable(&new),
            new_value: new,
        };

        let mut inner = self.inner.write().await;
        if !inner.histories.contains_key(&uuid) && inner.histories.len() >= self.max_sensors {
            if let Some(oldest_uuid) = inner
                .histories
                .iter()
                .min_by_key(|(_, h)| h.last_updated)
                .map(|(uuid, _)| *uuid)
            {
                inner.histories.shift_remove(&oldest_uuid);
            }
        }

        let history = inner.histories.entry(uuid).or_default();
        history.events.push_back(event);
        while history.events.len() > self.max_events_per_sensor {
            history.events.pop_front();
        }
        history.last_updated = now;
        drop(inner);
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn get_sensor_history(&self, uuid: &Uuid) -> Option<Vec<StateChangeEvent>> {
        let inner = self.inner.read().await;
        inner.histories.get(uuid).map(|h| h.events.iter().cloned().collect())
    }

    /// Most recent changes across every sensor, newest first.
    pub async fn get_recent_changes(&self, limit: usize) -> Vec<(Uuid, StateChangeEvent)> {
        let inner = self.inner.read().await;
        let mut all: Vec<(Uuid, StateChangeEvent)> = inner
            .histories
            .iter()
            .flat_map(|(uuid, h)| h.events.iter().map(move |e| (*uuid, e.clone())))
            .collect();
        all.sort_by(|a, b| b.1.timestamp_unix.cmp(&a.1.timestamp_unix));
        all.truncate(limit);
        all
    }

    pub async fn get_changes_since(&self, timestamp_unix: i64) -> Vec<(Uuid, StateChangeEvent)> {
        let inner = self.inner.read().await;
        let mut all: Vec<(Uuid, StateChangeEvent)> = inner
            .histories
            .iter()
            .flat_map(|(uuid, h)| h.events.iter().filter(|e| e.timestamp_unix >= timestamp_unix).map(move |e| (*uuid, e.clone())))
            .collect();
        all.sort_by(|a, b| a.1.timestamp_unix.cmp(&b.1.timestamp_unix));
        all
    }

    /// Activity summary for a set of door/window UUIDs over the trailing
    /// `hours` window (spec §4.9, §6 tool `get_door_window_activity`).
    pub async fn get_door_window_activity(
        &self,
        door_window_uuids: &[Uuid],
        hours: i64,
    ) -> DoorWindowActivity {
        let since = now_unix() - hours * 3600;
        let inner = self.inner.read().await;
        let mut sensor_activity: IndexMap<Uuid, usize> = IndexMap::new();
        let mut all: Vec<(Uuid, StateChangeEvent)> = Vec::new();
        for uuid in door_window_uuids {
            let Some(history) = inner.histories.get(uuid) else { continue };
            let matching: Vec<&StateChangeEvent> =
                history.events.iter().filter(|e| e.timestamp_unix >= since).collect();
            sensor_activity.insert(*uuid, matching.len());
            all.extend(matching.into_iter().map(|e| (*uuid, e.clone())));
        }
        all.sort_by(|a, b| b.1.timestamp_unix.cmp(&a.1.timestamp_unix));
        all.truncate(20);
        DoorWindowActivity { timeline: all, sensor_activity }
    }

    pub async fn get_statistics(&self) -> SensorStatistics {
        let inner = self.inner.read().await;
        let total_events: usize = inner.histories.values().map(|h| h.events.len()).sum();
        let oldest_event_unix = inner
            .histories
            .values()
            .filter_map(|h| h.events.front())
            .map(|e| e.timestamp_unix)
            .min();
        let newest_event_unix = inner
            .histories
            .values()
            .filter_map(|h| h.events.back())
            .map(|e| e.timestamp_unix)
            .max();
        let most_active_sensor = inner
            .histories
            .iter()
            .max_by_key(|(_, h)| h.events.len())
            .map(|(uuid, h)| (*uuid, h.events.len()));

        SensorStatistics {
            sensors_tracked: inner.histories.len(),
            total_events,
            oldest_event_unix,
            newest_event_unix,
            most_active_sensor,
        }
    }

    /// Atomic write-temp-then-rename persistence. Skips the write entirely
    /// if nothing has changed since the last call (spec §4.9: "every
    /// `sync_interval` seconds... if dirty, serialize").
    pub async fn persist_logs(&self) -> Result<(), LoxoneError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        let now = now_unix();
        inner.last_persisted = now;
        let persisted = PersistedLog {
            session_start: self.session_start,
            last_persisted: now,
            sensor_histories: inner.histories.clone(),
        };
        drop(inner);

        if let Err(e) = self.persist_to_disk(&persisted).await {
            // Didn't make it to disk; leave the marker set so the next tick retries.
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    async fn persist_to_disk(&self, persisted: &PersistedLog) -> Result<(), LoxoneError> {
        let json = serde_json::to_vec_pretty(persisted).map_err(|e| LoxoneError::Decode(e.to_string()))?;
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LoxoneError::CredentialStore(e.to_string()))?;
        }
        let tmp_path = self.log_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| LoxoneError::CredentialStore(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.log_path)
            .await
            .map_err(|e| LoxoneError::CredentialStore(e.to_string()))?;
        Ok(())
    }

    /// Spawn the periodic sync task. Intended to be called once at startup;
    /// the returned handle can be aborted on shutdown.
    pub fn spawn_sync_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(e) = self.persist_logs().await {
                    tracing::warn!(err = %e, "periodic sensor log sync failed");
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.persist_logs().await {
            tracing::warn!(err = %e, "final sensor log sync on shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_log() -> (SensorStateLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_log.json");
        let log = SensorStateLog::load(path, 3, 2, Duration::from_secs(600)).await.unwrap();
        (log, dir)
    }

    #[tokio::test]
    async fn ring_buffer_caps_events_per_sensor() {
        let (log, _dir) = fresh_log().await;
        let uuid = Uuid::new_v4();
        for i in 0..5 {
            log.log_state_change(uuid, None, Value::Double(i as f64)).await;
        }
        let history = log.get_sensor_history(&uuid).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.first().unwrap().new_value, Value::Double(2.0));
    }

    #[tokio::test]
    async fn lru_eviction_drops_least_recently_updated_sensor() {
        let (log, _dir) = fresh_log().await;
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();
        log.log_state_change(u1, None, Value::Double(1.0)).await;
        log.log_state_change(u2, None, Value::Double(1.0)).await;
        // max_sensors is 2, so introducing u3 evicts u1 (oldest last_updated).
        log.log_state_change(u3, None, Value::Double(1.0)).await;
        assert!(log.get_sensor_history(&u1).await.is_none());
        assert!(log.get_sensor_history(&u2).await.is_some());
        assert!(log.get_sensor_history(&u3).await.is_some());
    }

    #[tokio::test]
    async fn persist_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_log.json");
        let uuid = Uuid::new_v4();
        {
            let log = SensorStateLog::load(path.clone(), 10, 10, Duration::from_secs(600)).await.unwrap();
            log.log_state_change(uuid, None, Value::Double(1.0)).await;
            log.persist_logs().await.unwrap();
        }
        let reloaded = SensorStateLog::load(path, 10, 10, Duration::from_secs(600)).await.unwrap();
        let history = reloaded.get_sensor_history(&uuid).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn persist_logs_is_a_noop_when_nothing_changed_since_the_last_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_log.json");
        let uuid = Uuid::new_v4();
        let log = SensorStateLog::load(path.clone(), 10, 10, Duration::from_secs(600)).await.unwrap();

        log.log_state_change(uuid, None, Value::Double(1.0)).await;
        log.persist_logs().await.unwrap();
        let first_write = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.persist_logs().await.unwrap();
        let second_write = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();
        assert_eq!(first_write, second_write, "an undirtied log must not rewrite the file");

        log.log_state_change(uuid, Some(Value::Double(1.0)), Value::Double(2.0)).await;
        log.persist_logs().await.unwrap();
        let third_write = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();
        assert!(third_write >= second_write, "a fresh change must be persisted again");
    }

    #[tokio::test]
    async fn recent_changes_are_ordered_newest_first() {
        let (log, _dir) = fresh_log().await;
        let uuid = Uuid::new_v4();
        log.log_state_change(uuid, None, Value::Double(1.0)).await;
        log.log_state_change(uuid, None, Value::Double(2.0)).await;
        let recent = log.get_recent_changes(10).await;
        assert_eq!(recent[0].1.new_value, Value::Double(2.0));
    }

    #[tokio::test]
    async fn statistics_reflect_logged_events() {
        let (log, _dir) = fresh_log().await;
        let uuid = Uuid::new_v4();
        log.log_state_change(uuid, None, Value::Double(1.0)).await;
        let stats = log.get_statistics().await;
        assert_eq!(stats.sensors_tracked, 1);
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.most_active_sensor.map(|(u, _)| u), Some(uuid));
    }
}
