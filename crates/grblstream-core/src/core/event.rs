//! Event system for device communication
//!
//! Provides:
//! - Event types for telemetry, transcript lines and connection changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{DeviceState, LogEntry, StatusReport};
use crate::gcode::{GCode, SourceLine};
use tokio::sync::broadcast;

/// Device event types
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A status report was parsed
    Status(StatusReport),
    /// A raw line from the controller, for the user-facing transcript
    Message {
        line: String,
        /// No command was in flight when the line arrived
        unsolicited: bool,
    },
    /// A `[MSG:...]` log line was parsed
    Log(LogEntry),
    /// An `ALARM:` line was received
    Alarm {
        line: String,
        /// Decoded alarm description
        description: String,
    },
    /// The device finished opening and has reported its status
    Connected,
    /// The transport was closed or lost
    Disconnected,
    /// Device state transition
    StateChanged(DeviceState),
    /// A G-code line from a stream was transmitted and acknowledged
    Sent { gcode: GCode, line: SourceLine },
}

impl std::fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Status(status) => write!(f, "Status: {}", status.state),
            DeviceEvent::Message { line, .. } => write!(f, "Message: {}", line),
            DeviceEvent::Log(log) => write!(f, "Log [{}]: {}", log.kind, log.message),
            DeviceEvent::Alarm { line, description } => {
                write!(f, "Alarm {} ({})", line, description)
            }
            DeviceEvent::Connected => write!(f, "Connected"),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::StateChanged(state) => write!(f, "State: {}", state),
            DeviceEvent::Sent { line, .. } => write!(f, "Sent line {}: {}", line.number, line.text),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
///
/// Each device owns its own dispatcher; nothing is shared between devices.
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for device events.
    tx: broadcast::Sender<DeviceEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers reached; publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: DeviceEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
