//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metrics stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint of the metrics feed
    #[serde(default = "default_url")]
    pub url: String,

    /// Fixed delay between losing the stream and the next attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Connect as soon as the client is spawned
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

fn default_url() -> String {
    "ws://localhost:4000/api/ws/metrics".to_string()
}

fn default_reconnect_delay() -> u64 {
    3000 // 3 seconds
}

fn default_auto_connect() -> bool {
    true
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay(),
            auto_connect: default_auto_connect(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// Does not log. Call [`ConfigOrigin::log`] once a subscriber is installed.
    pub fn load_default() -> (Self, ConfigOrigin) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("metrics-feed").join("config.toml")),
            Some(PathBuf::from("/etc/metrics-feed/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first candidate that exists and parses
    fn load_first(paths: &[PathBuf]) -> (Self, ConfigOrigin) {
        let mut origin = ConfigOrigin::default();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    origin.path = Some(path.clone());
                    return (config, origin);
                }
                Err(e) => origin.skipped.push(e),
            }
        }

        (Self::from_env(), origin)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Stream overrides
        if let Some(url) = lookup("METRICS_FEED_URL") {
            self.stream.url = url;
        }
        if let Some(delay) = lookup("METRICS_FEED_RECONNECT_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                self.stream.reconnect_delay_ms = ms;
            }
        }
        if let Some(auto) = lookup("METRICS_FEED_AUTO_CONNECT") {
            self.stream.auto_connect = auto.to_lowercase() != "false" && auto != "0";
        }

        // Logging overrides
        if let Some(level) = lookup("METRICS_FEED_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("METRICS_FEED_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Where [`Config::load_default`] found its settings
#[derive(Debug, Default)]
pub struct ConfigOrigin {
    /// File the config was read from; `None` means defaults plus environment
    pub path: Option<PathBuf>,
    /// Candidate files that exist but failed to load
    pub skipped: Vec<ConfigError>,
}

impl ConfigOrigin {
    pub fn log(&self) {
        for e in &self.skipped {
            tracing::warn!("Skipping config: {}", e);
        }
        match &self.path {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# metrics-feed configuration
#
# Environment variables override these settings:
# - METRICS_FEED_URL
# - METRICS_FEED_RECONNECT_DELAY_MS
# - METRICS_FEED_AUTO_CONNECT
# - METRICS_FEED_LOG_LEVEL
# - METRICS_FEED_LOG_FORMAT

[stream]
# WebSocket endpoint pushing system metrics snapshots
url = "ws://localhost:4000/api/ws/metrics"

# Fixed delay before reconnecting after the stream is lost (ms)
reconnect_delay_ms = 3000

# Connect immediately on startup
auto_connect = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
