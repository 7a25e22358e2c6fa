//! Configuration module for downtally.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use crate::db::HistoryMode;
use crate::probe::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_DETECTION_PHRASE};
use crate::scheduler::{ProbeSettings, DEFAULT_LOG_CAP};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "downtally.db")
    pub db_path: String,
    /// Target probed until the store holds an override
    pub target_url: String,
    pub detection_phrase: String,
    /// Relay prefix tried right after the direct request (default: none)
    pub relay: String,
    /// Time between scheduled probe cycles (default: 60s)
    pub poll_interval: Duration,
    /// Per-transport timeout (default: 15s)
    pub attempt_timeout: Duration,
    pub history_mode: HistoryMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "downtally.db".to_string(),
            target_url: "https://example.com/".to_string(),
            detection_phrase: DEFAULT_DETECTION_PHRASE.to_string(),
            relay: String::new(),
            poll_interval: Duration::from_secs(60),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            history_mode: HistoryMode::Daily,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DOWNTALLY_HTTP_PORT`: HTTP port (default: 8080)
    /// - `DOWNTALLY_DB_PATH`: Database file path (default: "downtally.db")
    /// - `DOWNTALLY_TARGET_URL`: Default probe target
    /// - `DOWNTALLY_PHRASE`: Default detection phrase
    /// - `DOWNTALLY_RELAY`: Default relay prefix
    /// - `DOWNTALLY_INTERVAL_SECS`: Poll interval in seconds (default: 60)
    /// - `DOWNTALLY_TIMEOUT_SECS`: Per-attempt timeout in seconds (default: 15)
    /// - `DOWNTALLY_HISTORY`: `daily` or `log` (default: daily)
    /// - `DOWNTALLY_HISTORY_CAP`: Maximum log entries (default: 500)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = lookup("DOWNTALLY_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("DOWNTALLY_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(target) = lookup("DOWNTALLY_TARGET_URL") {
            cfg.target_url = target;
        }

        if let Some(phrase) = lookup("DOWNTALLY_PHRASE").filter(|s| !s.trim().is_empty()) {
            cfg.detection_phrase = phrase;
        }

        if let Some(relay) = lookup("DOWNTALLY_RELAY") {
            cfg.relay = relay;
        }

        if let Some(secs) = lookup("DOWNTALLY_INTERVAL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.poll_interval = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = lookup("DOWNTALLY_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.attempt_timeout = Duration::from_secs(secs);
            }
        }

        let cap = lookup("DOWNTALLY_HISTORY_CAP")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|cap| *cap > 0)
            .unwrap_or(DEFAULT_LOG_CAP);

        match lookup("DOWNTALLY_HISTORY").as_deref().map(str::trim) {
            Some("log") => cfg.history_mode = HistoryMode::Log { max: cap },
            Some("daily") | None => {}
            Some(other) => {
                tracing::warn!("Unknown history mode {:?}, using daily", other);
            }
        }

        cfg
    }

    /// Probe settings used until the store holds overrides.
    pub fn probe_defaults(&self) -> ProbeSettings {
        ProbeSettings {
            target_url: self.target_url.clone(),
            detection_phrase: self.detection_phrase.clone(),
            relay_override: self.relay.clone(),
        }
    }
}
