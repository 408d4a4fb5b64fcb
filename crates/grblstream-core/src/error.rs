//! Error handling for grblstream
//!
//! Provides error types for every layer of the device communication engine:
//! - Connection errors (opening, writing to and closing a line transport)
//! - Protocol errors (malformed status reports and log lines)
//! - Controller errors (rejected commands, state-gated operations, queue flushes)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents failures reported by, or enforced on behalf of, the CNC
/// controller: explicit `error:` replies, operations that are invalid in the
/// current device state and commands discarded by a queue flush.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Device is not open
    #[error("Device not open")]
    NotConnected,

    /// Device is already open
    #[error("Device already open")]
    AlreadyConnected,

    /// Operation is not permitted in the current device state
    #[error("Cannot send {command:?} while device is {state}")]
    InvalidState {
        /// The device state name at the time of the call.
        state: String,
        /// The command that was refused.
        command: String,
    },

    /// The controller answered a command with an `error:` line
    #[error("{line} ({description})")]
    CommandFailed {
        /// The raw error line, e.g. `error:20`.
        line: String,
        /// Human readable description of the error code.
        description: String,
        /// Lines received for the command before the error line, joined by `\n`.
        response: String,
    },

    /// The command was discarded before completing (reset, disconnect or clear)
    #[error("Command discarded: {reason}")]
    Discarded {
        /// Why the queue was flushed.
        reason: String,
    },

    /// Generic controller error
    #[error("Controller error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Protocol error type
///
/// Raised by the wire-format parsers when a line does not follow the GRBL
/// grammar it was classified as.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Status report is not enclosed in angle brackets
    #[error("Invalid status format. Got: {line}")]
    InvalidStatus {
        /// The offending line.
        line: String,
    },

    /// Status report field carried an unparseable value
    #[error("Invalid value for status field {field}: {value:?}")]
    InvalidStatusField {
        /// The field key, e.g. `MPos`.
        field: String,
        /// The raw value.
        value: String,
    },

    /// Log line does not match `[MSG:TYPE]` or `[MSG:TYPE: text]`
    #[error("Invalid log format. Got: {line}")]
    InvalidLog {
        /// The offending line.
        line: String,
    },
}

/// Connection error type
///
/// Represents errors raised by line transports: serial ports, TCP sockets,
/// WebSockets and in-process streams.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open the channel
    #[error("Failed to open {target}: {reason}")]
    FailedToOpen {
        /// Port name, address or URL.
        target: String,
        /// The reason the channel failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Keepalive watchdog expired
    #[error("No keepalive received within {timeout_ms}ms")]
    KeepaliveTimeout {
        /// The watchdog window in milliseconds.
        timeout_ms: u64,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// WebSocket error
    #[error("WebSocket error: {reason}")]
    WebSocketError {
        /// The reason for the WebSocket error.
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Transport has been closed
    #[error("Transport closed")]
    Closed,
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::IoError {
            reason: e.to_string(),
        }
    }
}

/// Main error type for grblstream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Shorthand for a command discarded by a queue flush
    pub fn discarded(reason: impl Into<String>) -> Self {
        Error::Controller(ControllerError::Discarded {
            reason: reason.into(),
        })
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a state-gating error
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::InvalidState { .. })
                | Error::Controller(ControllerError::NotConnected)
        )
    }

    /// Check if the controller replied with an `error:` line
    pub fn is_command_error(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::CommandFailed { .. }))
    }

    /// Check if the command was discarded by a flush
    pub fn is_discarded(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Discarded { .. }))
    }

    /// Check if this is a protocol (parse) error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
