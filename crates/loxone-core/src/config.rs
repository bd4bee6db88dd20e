// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Loxone MCP Bridge Contributors

use std::time::Duration;

/// Configuration for the Loxone protocol adapter.
#[derive(Debug, Clone, clap::Args)]
pub struct LoxoneConfig {
    /// Miniserver hostname or IP address.
    #[arg(long, env = "LOXONE_HOST")]
    pub host: String,

    /// Miniserver HTTP/WS port.
    #[arg(long, default_value_t = 80, env = "LOXONE_PORT")]
    pub port: u16,

    /// Miniserver account username.
    #[arg(long, env = "LOXONE_USER")]
    pub user: String,

    /// Miniserver account password.
    #[arg(long, env = "LOXONE_PASS")]
    pub password: String,

    /// Enable optional RSA/AES command encryption (disabled on certificate failure).
    #[arg(long, default_value_t = false, env = "LOXONE_USE_ENCRYPTION")]
    pub use_encryption: bool,

    /// Fixed delay before a WebSocket reconnect attempt, in seconds.
    #[arg(long, default_value_t = 5, env = "LOXONE_RECONNECT_DELAY_SECS")]
    pub reconnect_delay_secs: u64,

    /// Maximum WebSocket reconnect attempts. Negative means unbounded.
    #[arg(long, default_value_t = -1, env = "LOXONE_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: i64,

    /// Refresh the session token once fewer than this many seconds remain.
    #[arg(long, default_value_t = 300, env = "LOXONE_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: i64,

    /// Interval between state-change log disk syncs, in seconds.
    #[arg(long, default_value_t = 600, env = "LOXONE_LOG_SYNC_INTERVAL_SECS")]
    pub sync_interval_secs: u64,

    /// Ring buffer capacity per tracked sensor.
    #[arg(long, default_value_t = 100, env = "LOXONE_MAX_EVENTS_PER_SENSOR")]
    pub max_events_per_sensor: usize,

    /// Maximum number of sensors tracked before LRU eviction.
    #[arg(long, default_value_t = 1000, env = "LOXONE_MAX_SENSORS")]
    pub max_sensors: usize,

    /// Path to the state-change log JSON file.
    #[arg(long, env = "LOXONE_LOG_PATH")]
    pub log_path: Option<std::path::PathBuf>,

    /// Default sensor discovery window, in seconds.
    #[arg(long, default_value_t = 30, env = "LOXONE_DISCOVERY_WINDOW_SECS")]
    pub discovery_window_secs: u64,

    /// Log level, consumed when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "LOXONE_LOG_LEVEL")]
    pub log_level: String,
}

impl LoxoneConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }

    /// Default log file location under the XDG state directory, used when
    /// `log_path` is not set explicitly.
    pub fn resolved_log_path(&self) -> std::path::PathBuf {
        self.log_path.clone().unwrap_or_else(|| crate::credential::state_dir().join("sensor_log.json"))
    }
}
