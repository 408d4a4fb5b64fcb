//! # grblstream
//!
//! Streams G-code to GRBL-family CNC controllers and reports machine
//! telemetry.
//!
//! ## Architecture
//!
//! grblstream is organized as a workspace with multiple crates:
//!
//! 1. **grblstream-core** - Error types, device state, events, G-code parsing, stream sender
//! 2. **grblstream-communication** - Transports, command queue, GRBL protocol engine
//! 3. **grblstream-settings** - Configuration files and validation
//! 4. **grblstream** - Logging setup and config to device wiring
//!
//! ## Example
//!
//! ```no_run
//! use grblstream::{device_from_config, send_lines, CncDevice, Config};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load_from_file(&grblstream::default_config_path()?)?;
//! let device = device_from_config(&config);
//! device.open().await?;
//! send_lines(&device, grblstream::lines_from_text("G21\nG0 X10\n"), Some(2)).await?;
//! device.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

pub use grblstream_core::{
    lines_from_text, parse_gcode, send_lines, CncDevice, ConnectionError, ControllerError,
    DeviceEvent, DeviceState, Error, EventDispatcher, GCode, LineSource, LogEntry, LogKind,
    ProtocolError, Result, StatusReport,
};

pub use grblstream_communication::{
    list_ports, Connector, GrblDevice, GrblDeviceConfig, InProcessConnector, LineEvents,
    LineTransport, SerialConnector, SerialPortInfo, TcpConnector, TransportEvent,
    WebSocketConnector,
};

pub use grblstream_settings::{
    default_path as default_config_path, Config, ConnectionSettings, ConnectionType,
    DeviceSettings, PollInterval, SettingsError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Transport binding chosen from configuration
#[derive(Debug)]
pub enum ConfiguredConnector {
    Serial(SerialConnector),
    Tcp(TcpConnector),
    WebSocket(WebSocketConnector),
}

#[async_trait]
impl Connector for ConfiguredConnector {
    type Transport = Box<dyn LineTransport>;

    async fn connect(&self) -> std::result::Result<(Self::Transport, LineEvents), ConnectionError> {
        match self {
            Self::Serial(c) => {
                let (transport, events) = c.connect().await?;
                Ok((Box::new(transport), events))
            }
            Self::Tcp(c) => {
                let (transport, events) = c.connect().await?;
                Ok((Box::new(transport), events))
            }
            Self::WebSocket(c) => {
                let (transport, events) = c.connect().await?;
                Ok((Box::new(transport), events))
            }
        }
    }

    fn identifier(&self) -> String {
        match self {
            Self::Serial(c) => c.identifier(),
            Self::Tcp(c) => c.identifier(),
            Self::WebSocket(c) => c.identifier(),
        }
    }
}

/// Build the transport binding named by `settings`
pub fn connector_from_settings(settings: &ConnectionSettings) -> ConfiguredConnector {
    match settings.connection_type {
        ConnectionType::Serial => ConfiguredConnector::Serial(SerialConnector::new(
            settings.port.clone(),
            settings.baud_rate,
        )),
        ConnectionType::Tcp => {
            ConfiguredConnector::Tcp(TcpConnector::new(settings.host.clone(), settings.tcp_port))
        }
        ConnectionType::WebSocket => ConfiguredConnector::WebSocket(
            WebSocketConnector::new(settings.url.clone())
                .with_keepalive_timeout(settings.keepalive_timeout()),
        ),
    }
}

/// Engine tuning from the `device` section
pub fn device_config(settings: &DeviceSettings) -> GrblDeviceConfig {
    GrblDeviceConfig {
        status_poll_interval: settings.status_poll_interval(),
        event_capacity: settings.event_capacity,
    }
}

/// A closed device ready to `open()`
pub fn device_from_config(config: &Config) -> GrblDevice<ConfiguredConnector> {
    tracing::debug!(
        "Configuring {} device from settings",
        config.connection.connection_type
    );
    GrblDevice::with_config(
        connector_from_settings(&config.connection),
        device_config(&config.device),
    )
}

/// Initialize logging with the default configuration
///
/// Console output, filtered by `RUST_LOG` with `info` as the default level.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
