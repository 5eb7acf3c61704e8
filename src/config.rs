use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;

use crate::tracker::TrackerSettings;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    pub backend: Backend,
    #[serde(default)]
    pub tracker: Tracker,
}

#[derive(Debug, Deserialize)]
pub struct General {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cart session the binary mounts. Overridden by `BOOKING_SESSION_ID`.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Tracker {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Nominal hold length used for the percentage when a window is degenerate
    #[serde(default = "default_fallback_window_secs")]
    pub fallback_window_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_fallback_window_secs() -> u64 {
    900
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            fallback_window_secs: default_fallback_window_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Environment wins over the file for the backend location and session.
    fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BOOKING_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(session) = lookup("BOOKING_SESSION_ID") {
            self.backend.session_id = Some(session);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            tick_interval: Duration::from_millis(self.tracker.tick_interval_ms.max(1)),
            fallback_window: Duration::from_secs(self.tracker.fallback_window_secs),
        }
    }
}
