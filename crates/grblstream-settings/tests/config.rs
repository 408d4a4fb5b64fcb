//! File round-trips for grblstream-settings

use grblstream_settings::{
    Config, ConfigError, ConnectionType, PollInterval, SettingsError,
};
use std::time::Duration;
use tempfile::TempDir;

fn websocket_config() -> Config {
    let mut config = Config::default();
    config.connection.connection_type = ConnectionType::WebSocket;
    config.connection.url = "ws://fluidnc.local:81".to_string();
    config.connection.keepalive_timeout_ms = 5000;
    config.device.status_poll_interval_ms = PollInterval::Infinite;
    config
}

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let config = websocket_config();
    config.save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("type = \"websocket\""));
    assert!(text.contains("status_poll_interval_ms = \"infinite\""));

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.connection.keepalive_timeout(), Duration::from_secs(5));
    assert_eq!(loaded.device.status_poll_interval(), None);
}

#[test]
fn test_json_round_trip_in_new_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.connection.port = "COM3".to_string();
    config.connection.baud_rate = 250000;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.connection.port, "COM3");
    assert_eq!(loaded.connection.baud_rate, 250000);
    assert_eq!(
        loaded.device.status_poll_interval(),
        Some(Duration::from_millis(250))
    );
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[connection]\ntype = \"tcp\"\nhost = \"10.0.0.7\"\ntcp_port = 8080\n",
    )
    .unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.connection.connection_type, ConnectionType::Tcp);
    assert_eq!(loaded.connection.tcp_port, 8080);
    assert_eq!(loaded.device.event_capacity, 256);
}

#[test]
fn test_invalid_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[device]\nevent_capacity = 0\n[connection]\nport = \"x\"\n").unwrap();

    match Config::load_from_file(&path) {
        Err(SettingsError::Config(ConfigError::ValueOutOfRange { key, .. })) => {
            assert_eq!(key, "device.event_capacity")
        }
        other => panic!("expected range error, got {:?}", other),
    }

    std::fs::write(&path, "connection = [").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    assert!(matches!(
        websocket_config().save_to_file(&path),
        Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
    ));
    assert!(!path.exists());
}

#[test]
fn test_load_or_default_missing_file() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
}
