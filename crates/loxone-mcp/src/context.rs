// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Shared handle passed to every tool function: the live Loxone client plus
//! whatever discovery results the last `discover_new_sensors` call produced.

use std::sync::Arc;

use loxone_core::discovery::DiscoveredSensor;
use loxone_core::LoxoneClient;
use tokio::sync::RwLock;

/// State threaded through every tool call. Cheap to clone; `client` and the
/// discovery cache are both already reference-counted internally.
#[derive(Clone)]
pub struct ToolContext {
    pub client: Arc<LoxoneClient>,
    discovered_sensors: Arc<RwLock<Vec<DiscoveredSensor>>>,
}

impl ToolContext {
    pub fn new(client: Arc<LoxoneClient>) -> Self {
        Self { client, discovered_sensors: Arc::new(RwLock::new(Vec::new())) }
    }

    pub async fn set_discovered_sensors(&self, sensors: Vec<DiscoveredSensor>) {
        *self.discovered_sensors.write().await = sensors;
    }

    pub async fn discovered_sensors(&self) -> Vec<DiscoveredSensor> {
        self.discovered_sensors.read().await.clone()
    }
}
