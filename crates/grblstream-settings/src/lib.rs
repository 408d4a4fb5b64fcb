//! grblstream settings
//!
//! Connection and device configuration, stored as TOML or JSON.

pub mod config;
pub mod error;

pub use config::{
    default_path, Config, ConnectionSettings, ConnectionType, DeviceSettings, PollInterval,
    DEFAULT_BAUD_RATE, DEFAULT_EVENT_CAPACITY, DEFAULT_KEEPALIVE_TIMEOUT_MS,
    DEFAULT_STATUS_POLL_INTERVAL_MS,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
