// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

//! Facade bundling the HTTP command client, token manager, WebSocket
//! session, state mirror, structure catalogue, and sensor log into one
//! handle per Miniserver connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::catalogue::Catalogue;
use crate::config::LoxoneConfig;
use crate::discovery::{self, DiscoveredSensor};
use crate::error::LoxoneError;
use crate::http::LoxoneHttpClient;
use crate::sensor_log::SensorStateLog;
use crate::state::StateMirror;
use crate::token::TokenManager;
use crate::ws::client::LoxoneWsClient;

pub struct LoxoneClient {
    pub config: LoxoneConfig,
    pub http: Arc<LoxoneHttpClient>,
    pub token: Arc<TokenManager>,
    pub ws: Arc<LoxoneWsClient>,
    pub state: Arc<StateMirror>,
    pub sensor_log: Arc<SensorStateLog>,
    catalogue: RwLock<Catalogue>,
    ws_task: RwLock<Option<JoinHandle<Result<(), LoxoneError>>>>,
    sync_task: RwLock<Option<JoinHandle<()>>>,
}

impl LoxoneClient {
    /// Full startup sequence (spec §4.2-§4.9): authenticate, start the
    /// WebSocket reconnect loop, fetch the structure catalogue, load the
    /// sensor log, and wire the log to auto-record every state change.
    pub async fn connect(config: LoxoneConfig) -> Result<Self, LoxoneError> {
        let http = Arc::new(LoxoneHttpClient::new(&config.host, config.port));
        let token = Arc::new(TokenManager::new(
            Arc::clone(&http),
            config.user.clone(),
            config.password.clone(),
            config.use_encryption,
            config.refresh_margin_secs,
        ));
        token.connect().await?;

        let serial_number = http
            .reachability_probe()
            .await
            .ok()
            .and_then(|v| v.get("snr").and_then(|s| s.as_str()).map(str::to_owned));

        let mirror = Arc::new(StateMirror::new());

        let ws = Arc::new(LoxoneWsClient::new(
            config.host.clone(),
            config.port,
            config.reconnect_delay(),
            config.max_reconnect_attempts,
        ));
        let ws_task = {
            let ws = Arc::clone(&ws);
            let token = Arc::clone(&token);
            let mirror = Arc::clone(&mirror);
            tokio::spawn(async move { ws.run(token, mirror).await })
        };

        let catalogue = Catalogue::load(&http, &token, serial_number).await?;

        let sensor_log = Arc::new(
            SensorStateLog::load(
                config.resolved_log_path(),
                config.max_events_per_sensor,
                config.max_sensors,
                config.sync_interval(),
            )
            .await?,
        );
        let sync_task = Arc::clone(&sensor_log).spawn_sync_task();

        let log_for_subscriber = Arc::clone(&sensor_log);
        mirror
            .subscribe(Arc::new(move |uuid, old, new| {
                let log = Arc::clone(&log_for_subscriber);
                tokio::spawn(async move {
                    log.log_state_change(uuid, old, new).await;
                });
            }))
            .await;

        Ok(Self {
            config,
            http,
            token,
            ws,
            state: mirror,
            sensor_log,
            catalogue: RwLock::new(catalogue),
            ws_task: RwLock::new(Some(ws_task)),
            sync_task: RwLock::new(Some(sync_task)),
        })
    }

    pub async fn catalogue(&self) -> Catalogue {
        self.catalogue.read().await.clone()
    }

    /// Re-fetch `LoxAPP3.json`. Never cached to disk; always a live refetch
    /// (spec open question, recorded in the grounding ledger).
    pub async fn refresh_catalogue(&self) -> Result<(), LoxoneError> {
        let serial_number = self.catalogue.read().await.miniserver.serial_number.clone();
        let fresh = Catalogue::load(&self.http, &self.token, serial_number).await?;
        *self.catalogue.write().await = fresh;
        Ok(())
    }

    pub async fn discover_sensors(&self, window: Duration) -> Vec<DiscoveredSensor> {
        discovery::discover(&self.state, window).await
    }

    /// Issue an authenticated command, refreshing the token first if it is
    /// close to expiry (spec §4.3 refresh policy).
    pub async fn send_command(&self, path: &str) -> Result<serde_json::Value, LoxoneError> {
        self.token.ensure_fresh().await?;
        self.http.send(&self.token, path, true).await
    }

    /// Orderly shutdown: stop the WebSocket loop, abort the sync task after
    /// one final flush, and kill the session token, all bounded by one
    /// aggregate 10s budget (spec §5).
    pub async fn shutdown(&self) {
        let deadline = Duration::from_secs(10);
        if tokio::time::timeout(deadline, self.shutdown_inner()).await.is_err() {
            tracing::warn!("shutdown did not complete within the 10s budget, abandoning remaining steps");
        }
    }

    async fn shutdown_inner(&self) {
        self.ws.shutdown();
        if let Some(handle) = self.ws_task.write().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.sync_task.write().await.take() {
            handle.abort();
        }
        self.sensor_log.shutdown().await;
        self.token.kill().await;
    }
}
