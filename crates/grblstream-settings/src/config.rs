//! Configuration for grblstream
//!
//! Two sections:
//! - `connection`: which transport to open and its parameters
//! - `device`: protocol engine tuning (status polling, event buffering)
//!
//! Files are TOML or JSON, chosen by extension.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 115200;
pub const DEFAULT_KEEPALIVE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_STATUS_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Connection protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Serial/USB connection
    Serial,
    /// Raw TCP socket
    Tcp,
    /// WebSocket connection (FluidNC and ESP3D style)
    WebSocket,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Serial port path
    pub port: String,
    pub baud_rate: u32,
    /// Hostname for TCP connections
    pub host: String,
    pub tcp_port: u16,
    /// WebSocket URL, plain `ws://` only (no TLS support)
    pub url: String,
    /// Close a WebSocket link when no PING arrives within this window
    pub keepalive_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Serial,
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            host: String::new(),
            tcp_port: 23,
            url: String::new(),
            keepalive_timeout_ms: DEFAULT_KEEPALIVE_TIMEOUT_MS,
        }
    }
}

impl ConnectionSettings {
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive_timeout_ms == 0 {
            return Err(ConfigError::out_of_range(
                "connection.keepalive_timeout_ms",
                0,
            ));
        }

        match self.connection_type {
            ConnectionType::Serial => {
                if self.port.trim().is_empty() {
                    return Err(ConfigError::MissingKey("connection.port".to_string()));
                }
                if self.baud_rate == 0 {
                    return Err(ConfigError::out_of_range("connection.baud_rate", 0));
                }
            }
            ConnectionType::Tcp => {
                if self.host.trim().is_empty() {
                    return Err(ConfigError::MissingKey("connection.host".to_string()));
                }
                if self.tcp_port == 0 {
                    return Err(ConfigError::out_of_range("connection.tcp_port", 0));
                }
            }
            ConnectionType::WebSocket => {
                if self.url.trim().is_empty() {
                    return Err(ConfigError::MissingKey("connection.url".to_string()));
                }
                if !self.url.starts_with("ws://") {
                    return Err(ConfigError::out_of_range("connection.url", &self.url));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PollKeyword {
    Infinite,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPollInterval {
    Millis(u64),
    Keyword(PollKeyword),
}

/// Status poll interval: milliseconds, or `"infinite"` to disable polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPollInterval", into = "RawPollInterval")]
pub enum PollInterval {
    Millis(u64),
    Infinite,
}

impl From<RawPollInterval> for PollInterval {
    fn from(raw: RawPollInterval) -> Self {
        match raw {
            RawPollInterval::Millis(ms) => Self::Millis(ms),
            RawPollInterval::Keyword(PollKeyword::Infinite) => Self::Infinite,
        }
    }
}

impl From<PollInterval> for RawPollInterval {
    fn from(interval: PollInterval) -> Self {
        match interval {
            PollInterval::Millis(ms) => Self::Millis(ms),
            PollInterval::Infinite => Self::Keyword(PollKeyword::Infinite),
        }
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::Millis(DEFAULT_STATUS_POLL_INTERVAL_MS)
    }
}

impl PollInterval {
    /// `None` when polling is disabled
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Millis(ms) => Some(Duration::from_millis(*ms)),
            Self::Infinite => None,
        }
    }
}

/// Protocol engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub status_poll_interval_ms: PollInterval,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            status_poll_interval_ms: PollInterval::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DeviceSettings {
    pub fn status_poll_interval(&self) -> Option<Duration> {
        self.status_poll_interval_ms.as_duration()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.status_poll_interval_ms == PollInterval::Millis(0) {
            return Err(ConfigError::out_of_range(
                "device.status_poll_interval_ms",
                0,
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::out_of_range("device.event_capacity", 0));
        }
        Ok(())
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub device: DeviceSettings,
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a config file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate and write to file, creating parent directories as needed
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        let format = format_of(path)?;
        self.validate()?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

/// `<config_dir>/grblstream/config.toml`
pub fn default_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join("grblstream").join("config.toml"))
        .ok_or_else(|| {
            ConfigError::ConfigDirectory("platform config directory not found".to_string()).into()
        })
}
