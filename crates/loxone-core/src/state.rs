// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! State mirror (C6): the authoritative `UUID -> Value` map fed by the
//! WebSocket frame parser, with a synchronous subscriber fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::value::Value;

/// A subscriber callback invoked synchronously while the mirror's write
/// lock is held. Per spec §4.6, callbacks must not perform blocking I/O —
/// subscribers that need to do I/O (C8, C9) clone the tuple into a channel
/// and return immediately.
pub type Subscriber = Arc<dyn Fn(Uuid, Option<Value>, Value) + Send + Sync>;

/// Authoritative live state, guarded by one lock (spec §4.6, §5).
pub struct StateMirror {
    values: RwLock<HashMap<Uuid, Value>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self { values: RwLock::new(HashMap::new()), subscribers: RwLock::new(Vec::new()) }
    }

    pub async fn get(&self, uuid: &Uuid) -> Option<Value> {
        self.values.read().await.get(uuid).cloned()
    }

    /// Copy of the full map, for bulk reads (e.g. `get_system_status`).
    pub async fn snapshot(&self) -> HashMap<Uuid, Value> {
        self.values.read().await.clone()
    }

    /// Register a subscriber. Returns nothing identifying it — the mirror
    /// has no need to remove individual subscribers; C8's discovery window
    /// instead filters on a shared `active` flag it owns itself.
    pub async fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Apply an update. Returns the previous value, if any. Subscribers are
    /// only notified when the value actually changed (spec §4.5: "if it
    /// differs from the current value ... publish"). Notification happens
    /// while the write lock on `values` is held, satisfying the ordering
    /// guarantee that subscribers observe updates in application order
    /// (spec §5).
    pub async fn apply(&self, uuid: Uuid, value: Value) -> Option<Value> {
        let mut values = self.values.write().await;
        let old = values.insert(uuid, value.clone());
        let changed = match &old {
            Some(prev) => prev != &value,
            None => true,
        };
        if changed {
            let subscribers = self.subscribers.read().await;
            for subscriber in subscribers.iter() {
                subscriber(uuid, old.clone(), value.clone());
            }
        }
        old
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}
