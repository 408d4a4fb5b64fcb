//! GRBL line protocol
//!
//! Line classification, wire-format parsers, error/alarm decoding and the
//! protocol engine driving a transport.

pub mod device;
pub mod error_decoder;
pub mod log_parser;
pub mod response;
pub mod status_parser;

pub use device::{GrblDevice, GrblDeviceConfig, DEFAULT_STATUS_POLL_INTERVAL};
pub use error_decoder::{decode_alarm, decode_error, describe_alarm_line, describe_error_line};
pub use log_parser::parse_log;
pub use response::{classify_line, GrblLine};
pub use status_parser::parse_status;

/// Status query
pub const STATUS_QUERY: &str = "?";
/// Soft reset, as a line
pub const RESET_COMMAND: &str = "\x18";
/// Soft reset realtime byte
pub const RESET_BYTE: u8 = 0x18;
/// Feed hold realtime byte
pub const FEED_HOLD: u8 = b'!';
/// Cycle start / resume realtime byte
pub const CYCLE_START: u8 = b'~';
pub const SLEEP_COMMAND: &str = "$SLP";
pub const UNLOCK_COMMAND: &str = "$X";
pub const HOME_COMMAND: &str = "$H";
