//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/moodlog/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/moodlog/` (~/.config/moodlog/)
//! - Data: `$XDG_DATA_HOME/moodlog/` (~/.local/share/moodlog/)
//! - State/Logs: `$XDG_STATE_HOME/moodlog/` (~/.local/state/moodlog/)

use crate::error::{Error, Result};
use crate::record::DEFAULT_MOODS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Known moods, in button order
    #[serde(default = "default_moods")]
    pub moods: Vec<String>,

    /// Remote collector endpoint
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Local queue storage
    #[serde(default)]
    pub queue: QueueConfig,

    /// Reachability check before syncing
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            moods: default_moods(),
            endpoint: EndpointConfig::default(),
            queue: QueueConfig::default(),
            connectivity: ConnectivityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_moods() -> Vec<String> {
    DEFAULT_MOODS.iter().map(|m| m.to_string()).collect()
}

/// Remote collector configuration
///
/// Records are delivered one GET per record to `url` with the record in the
/// query string.
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    /// Collector URL (e.g., a spreadsheet web app `.../exec` URL)
    pub url: Option<String>,

    /// Text the response body must contain for a record to count as accepted
    #[serde(default = "default_success_marker")]
    pub success_marker: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            success_marker: default_success_marker(),
            timeout_secs: default_timeout(),
        }
    }
}

impl EndpointConfig {
    /// Check if an endpoint is configured
    pub fn is_ready(&self) -> bool {
        self.url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("endpoint.url is required to sync".to_string()))?;

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("endpoint.url is not a valid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "endpoint.url must use http or https, got {}",
                parsed.scheme()
            )));
        }
        if self.success_marker.is_empty() {
            return Err(Error::Config(
                "endpoint.success_marker must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "endpoint.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_success_marker() -> String {
    "Success".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Queue storage configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueueConfig {
    /// Override path for the queue file
    pub path: Option<PathBuf>,

    /// Maximum number of queued records; oldest are evicted first.
    /// Unbounded when unset.
    pub max_records: Option<usize>,
}

impl QueueConfig {
    /// Configured queue path, or the default under the data directory
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Config::queue_path)
    }
}

/// How reachability is established before a sync
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityMode {
    /// Probe the endpoint host over TCP
    #[default]
    Probe,
    /// Assume the network is always reachable
    Always,
    /// Never sync; record locally only
    Never,
}

/// Connectivity gate configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub mode: ConnectivityMode,

    /// Probe attempts before giving up
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,

    /// Delay between probe attempts in milliseconds
    #[serde(default = "default_probe_interval")]
    pub interval_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            mode: ConnectivityMode::default(),
            attempts: default_probe_attempts(),
            interval_ms: default_probe_interval(),
        }
    }
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_interval() -> u64 {
    1000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate settings that do not depend on syncing
    pub fn validate(&self) -> Result<()> {
        if self.moods.is_empty() {
            return Err(Error::Config("moods must not be empty".to_string()));
        }
        if self.queue.max_records == Some(0) {
            return Err(Error::Config(
                "queue.max_records must be at least 1".to_string(),
            ));
        }
        if self.connectivity.attempts == 0 {
            return Err(Error::Config(
                "connectivity.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/moodlog/config.toml` (~/.config/moodlog/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("moodlog").join("config.toml")
    }

    /// Returns the data directory path (for the queue file)
    ///
    /// `$XDG_DATA_HOME/moodlog/` (~/.local/share/moodlog/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("moodlog")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/moodlog/` (~/.local/state/moodlog/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("moodlog")
    }

    /// Returns the default queue file path
    ///
    /// `$XDG_DATA_HOME/moodlog/mood_log.csv`
    pub fn queue_path() -> PathBuf {
        Self::data_dir().join("mood_log.csv")
    }
}
