//! Device capability interface
//!
//! `CncDevice` is the operation surface every backend exposes to upstream
//! collaborators (console, file sender, telemetry forwarders). Backends
//! implement the primitive operations; streaming a G-code source is provided
//! on top of `send`.

pub mod event;
pub mod streaming;

use crate::data::DeviceState;
use crate::error::Result;
use async_trait::async_trait;
use event::{DeviceEvent, EventDispatcher};
use streaming::LineSource;
use tokio::sync::broadcast;

/// Operations a CNC device backend provides
#[async_trait]
pub trait CncDevice: Send + Sync {
    /// Identifier of the underlying channel (port name, address or URL)
    fn name(&self) -> &str;

    /// Check if a transport is currently open
    fn is_open(&self) -> bool;

    /// Current device state
    fn state(&self) -> DeviceState;

    /// Event dispatcher owned by this device
    fn events(&self) -> &EventDispatcher;

    /// Subscribe to this device's events
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events().subscribe()
    }

    /// Open the transport and wait until the controller reports its status
    async fn open(&self) -> Result<()>;

    /// Wait for outstanding commands, then close the transport
    ///
    /// Closing a device that is not open succeeds.
    async fn close(&self) -> Result<()>;

    /// Send one line and wait for its response
    ///
    /// `emit_message` controls whether the resulting line traffic is surfaced
    /// as `DeviceEvent::Message`.
    async fn send_with(&self, line: &str, emit_message: bool) -> Result<String>;

    /// Send one line, surfacing its traffic as messages
    async fn send(&self, line: &str) -> Result<String> {
        self.send_with(line, true).await
    }

    /// Run the homing sequence
    ///
    /// `None` (or an empty slice) homes all axes with a single command;
    /// otherwise each listed axis is homed in turn.
    async fn home(&self, axes: Option<&[char]>) -> Result<()>;

    /// Soft-reset the controller, discarding every outstanding command
    async fn reset(&self) -> Result<()>;

    /// Feed hold
    async fn pause(&self) -> Result<()>;

    /// Cycle start / resume from feed hold
    async fn resume(&self) -> Result<()>;

    /// Put the controller to sleep
    async fn sleep(&self) -> Result<()>;

    /// Clear an alarm lock
    async fn unlock(&self) -> Result<()>;

    /// Send every line of `source` in order
    ///
    /// See [`streaming::send_lines`].
    async fn send_lines(&self, source: LineSource<'_>, total_lines: Option<usize>) -> Result<()> {
        streaming::send_lines(self, source, total_lines).await
    }
}
