use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use taskq::EngineConfig;
use taskq_store::StoreConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub payload: PayloadSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSettings {
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSettings {
    /// Quarantine handlers that run longer than this. Unset means no limit.
    #[serde(default)]
    pub handler_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadSettings {
    #[serde(default = "default_payload_warn_threshold_bytes")]
    pub warn_threshold_bytes: usize,
    #[serde(default = "default_payload_max_size_bytes")]
    pub max_size_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Buffered wake signals per subscriber before it reports lag
    #[serde(default = "default_queue_channel_capacity")]
    pub channel_capacity: usize,
    /// Maximum time in seconds to retry reconnecting the queue listener before giving up
    #[serde(default = "default_queue_max_reconnect_secs")]
    pub max_reconnect_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("db_max_connections", default_db_max_connections() as i64)?
            .set_default("admin.enabled", default_admin_enabled())?
            .set_default("admin.host", default_host())?
            .set_default("admin.port", default_admin_port() as i64)?
            .set_default(
                "payload.warn_threshold_bytes",
                default_payload_warn_threshold_bytes() as i64,
            )?
            .set_default(
                "payload.max_size_bytes",
                default_payload_max_size_bytes() as i64,
            )?
            .set_default(
                "queue.channel_capacity",
                default_queue_channel_capacity() as i64,
            )?
            .set_default(
                "queue.max_reconnect_secs",
                default_queue_max_reconnect_secs() as i64,
            )?
            .set_default("telemetry.log_level", default_log_level())?
            .set_default("telemetry.log_format", default_log_format())?;

        // Conventional DATABASE_URL works too, TASKQ_DATABASE_URL wins.
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", db_url)?;
        }

        builder
            // TASKQ_DATABASE_URL, TASKQ_ADMIN__PORT, TASKQ_ENGINE__HANDLER_TIMEOUT_SECS, ...
            .add_source(
                Environment::with_prefix("TASKQ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            payload_warn_threshold_bytes: self.payload.warn_threshold_bytes,
            payload_max_size_bytes: self.payload.max_size_bytes,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            handler_timeout: self
                .engine
                .handler_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            host: default_host(),
            port: default_admin_port(),
        }
    }
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            warn_threshold_bytes: default_payload_warn_threshold_bytes(),
            max_size_bytes: default_payload_max_size_bytes(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_queue_channel_capacity(),
            max_reconnect_secs: default_queue_max_reconnect_secs(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_admin_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_port() -> u16 {
    8080
}

fn default_payload_warn_threshold_bytes() -> usize {
    1024 * 1024
}

fn default_payload_max_size_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_queue_channel_capacity() -> usize {
    64
}

fn default_queue_max_reconnect_secs() -> u64 {
    300 // 5 minutes max reconnection attempts
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
