use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::poller::PollerConfig;
use crate::progress::{StatusAction, StatusMap};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub log_level: String,
    pub poll_interval_ms: u64,
    pub hide_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub max_consecutive_failures: Option<u32>,
    pub max_duration_secs: Option<u64>,
    /// Extra backend statuses, e.g. `starting = "pending"`.
    #[serde(default)]
    pub status_aliases: HashMap<String, String>,
    pub relay_enabled: bool,
    pub relay_port: u16,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load("config")
    }

    pub fn load(file_name: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Default settings
            .set_default("backend_url", "http://127.0.0.1:8000")?
            .set_default("log_level", "info")?
            .set_default("poll_interval_ms", 1000)?
            .set_default("hide_delay_ms", 3000)?
            .set_default("request_timeout_ms", 10_000)?
            .set_default("max_consecutive_failures", 60)?
            .set_default("max_duration_secs", 6 * 3600)?
            .set_default("relay_enabled", false)?
            .set_default("relay_port", 3000)?
            // Config file (optional)
            .add_source(File::with_name(file_name).required(false))
            // Environment variables (e.g. TUBECHAT_BACKEND_URL=http://host:8000)
            .add_source(Environment::with_prefix("TUBECHAT"));

        builder.build()?.try_deserialize()
    }

    pub fn status_map(&self) -> Result<StatusMap, ConfigError> {
        let mut map = StatusMap::default();
        for (status, action) in &self.status_aliases {
            let action: StatusAction = action.parse().map_err(|_| {
                ConfigError::Message(format!(
                    "unknown action {:?} for status {:?}",
                    action, status
                ))
            })?;
            map.insert(status, action);
        }
        Ok(map)
    }

    pub fn poller_config(&self) -> Result<PollerConfig, ConfigError> {
        Ok(PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            hide_delay: Duration::from_millis(self.hide_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures.filter(|n| *n > 0),
            max_duration: self
                .max_duration_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            statuses: self.status_map()?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
