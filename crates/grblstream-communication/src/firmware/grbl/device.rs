//! GRBL device
//!
//! Protocol engine for GRBL-family controllers. Owns a transport and a
//! [`CommandQueue`], classifies every received line, settles queued commands
//! on their terminators and tracks the device state.
//!
//! Each `send` is one queue item. The item writes its line and stays active
//! until the controller answers `ok` (or a sleep report), which resolves it
//! with every line received since the previous terminator, or `error:N`,
//! which rejects it. A reset, requested or observed through the reset banner,
//! rejects every outstanding command.

use super::error_decoder::{describe_alarm_line, describe_error_line};
use super::log_parser::parse_log;
use super::response::{classify_line, GrblLine};
use super::status_parser::parse_status;
use super::{
    CYCLE_START, FEED_HOLD, HOME_COMMAND, RESET_BYTE, RESET_COMMAND, SLEEP_COMMAND, STATUS_QUERY,
    UNLOCK_COMMAND,
};
use crate::communication::{
    CommandQueue, Connector, LineEvents, LineTransport, RecurringTaskId, TransportEvent,
};
use async_trait::async_trait;
use grblstream_core::{
    CncDevice, ConnectionError, ControllerError, DeviceEvent, DeviceState, EventDispatcher,
    Result, StatusReport,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Default status poll interval
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// GRBL device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrblDeviceConfig {
    /// Interval between `?` status queries; `None` disables polling
    pub status_poll_interval: Option<Duration>,
    /// Capacity of the event broadcast buffer
    pub event_capacity: usize,
}

impl Default for GrblDeviceConfig {
    fn default() -> Self {
        Self {
            status_poll_interval: Some(DEFAULT_STATUS_POLL_INTERVAL),
            event_capacity: 256,
        }
    }
}

/// Payload carried by each queued line
#[derive(Debug, Clone, Copy)]
struct LineRequest {
    emit_message: bool,
}

#[derive(Debug, Default)]
struct ProtocolState {
    state: DeviceState,
    /// Lines received since the last terminator
    pending_lines: Vec<String>,
    latest_status: Option<StatusReport>,
    status_poll: Option<RecurringTaskId>,
}

struct Shared<T> {
    name: String,
    queue: CommandQueue<String, LineRequest>,
    transport: RwLock<Option<Arc<T>>>,
    protocol: Mutex<ProtocolState>,
    events: EventDispatcher,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl<T: LineTransport + 'static> Shared<T> {
    fn state(&self) -> DeviceState {
        self.protocol.lock().state
    }

    fn set_state(&self, next: DeviceState) {
        let previous = {
            let mut protocol = self.protocol.lock();
            std::mem::replace(&mut protocol.state, next)
        };
        if previous != next {
            tracing::debug!("{}: {} -> {}", self.name, previous, next);
            self.events.publish(DeviceEvent::StateChanged(next));
        }
    }

    fn transport(&self) -> Result<Arc<T>> {
        self.transport
            .read()
            .clone()
            .ok_or_else(|| ControllerError::NotConnected.into())
    }

    fn take_response(&self) -> String {
        std::mem::take(&mut self.protocol.lock().pending_lines).join("\n")
    }

    fn buffer_line(&self, line: &str) {
        self.protocol.lock().pending_lines.push(line.to_string());
    }

    /// Reject a line the current state does not accept
    fn check_sendable(&self, line: &str) -> Result<()> {
        let state = self.state();
        let allowed = match state {
            DeviceState::Disconnected => return Err(ControllerError::NotConnected.into()),
            DeviceState::Resetting => false,
            DeviceState::Sleeping => line == STATUS_QUERY,
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(ControllerError::InvalidState {
                state: state.to_string(),
                command: line.to_string(),
            }
            .into())
        }
    }

    async fn send_line(&self, line: &str, emit_message: bool) -> Result<String> {
        self.check_sendable(line)?;
        let transport = self.transport()?;
        let line = line.to_string();

        self.queue
            .add(
                move |settle| async move {
                    tracing::debug!(">> {}", line);
                    if let Err(e) = transport.write(&line).await {
                        tracing::error!("Failed to write {:?}: {}", line, e);
                        settle.reject(e.into());
                    }
                },
                LineRequest { emit_message },
            )
            .await
    }

    /// Flush every outstanding command and wait for the init banner
    fn begin_reset(&self, reason: &str) {
        self.queue.clear_with(reason);
        self.protocol.lock().pending_lines.clear();
        self.set_state(DeviceState::Resetting);
    }

    fn stop_polling(&self) {
        let poll = self.protocol.lock().status_poll.take();
        if let Some(id) = poll {
            self.queue.remove_recurring(id);
        }
    }

    fn handle_line(&self, line: &str) {
        tracing::debug!("<< {}", line);
        let kind = classify_line(line);

        match kind {
            GrblLine::ResetBanner => {
                tracing::warn!("{}: controller reset detected", self.name);
                self.begin_reset("controller reset");
            }
            GrblLine::InitBanner if self.state() == DeviceState::Resetting => {
                tracing::info!("{}: {}", self.name, line);
                self.set_state(DeviceState::Normal);
            }
            _ => {}
        }

        let emit = self
            .queue
            .current_payload()
            .map_or(true, |request| request.emit_message);
        if emit {
            self.events.publish(DeviceEvent::Message {
                line: line.to_string(),
                unsolicited: !self.queue.is_pending(),
            });
        }

        let resetting = self.state() == DeviceState::Resetting;

        // Reported in every state, Resetting included; never settles the queue
        if kind == GrblLine::Log {
            match parse_log(line) {
                Ok(log) => {
                    self.events.publish(DeviceEvent::Log(log));
                }
                Err(e) => {
                    tracing::warn!("{}: {}", self.name, e);
                    if !resetting {
                        self.buffer_line(line);
                    }
                }
            }
            return;
        }

        if resetting {
            return;
        }

        match kind {
            GrblLine::ResetBanner | GrblLine::InitBanner | GrblLine::Log => {}
            GrblLine::Status | GrblLine::SleepReport => {
                match parse_status(line) {
                    Ok(status) => self.apply_status(status),
                    Err(e) => tracing::warn!("{}: {}", self.name, e),
                }
                self.buffer_line(line);
                if kind == GrblLine::SleepReport {
                    self.settle_ok();
                }
            }
            GrblLine::Ok => self.settle_ok(),
            GrblLine::Error(_) => {
                let response = self.take_response();
                let error = ControllerError::CommandFailed {
                    line: line.to_string(),
                    description: describe_error_line(line),
                    response,
                };
                if !self.queue.reject_active(error.clone().into()) {
                    tracing::warn!("{}: {} with no command in flight", self.name, error);
                }
            }
            GrblLine::Alarm(_) => {
                let description = describe_alarm_line(line);
                tracing::warn!("{}: {} ({})", self.name, line, description);
                self.set_state(DeviceState::Alarm);
                self.events.publish(DeviceEvent::Alarm {
                    line: line.to_string(),
                    description,
                });
            }
            GrblLine::Other => self.buffer_line(line),
        }
    }

    fn settle_ok(&self) {
        let response = self.take_response();
        if !self.queue.resolve_active(response) {
            tracing::debug!("{}: terminator with no command in flight", self.name);
        }
    }

    fn apply_status(&self, status: StatusReport) {
        let next = match status.state.as_str() {
            "Sleep" => DeviceState::Sleeping,
            "Alarm" => DeviceState::Alarm,
            _ => DeviceState::Normal,
        };
        self.protocol.lock().latest_status = Some(status.clone());
        if self.state() != DeviceState::Disconnected {
            self.set_state(next);
        }
        self.events.publish(DeviceEvent::Status(status));
    }

    fn handle_disconnect(&self) {
        if self.transport.write().take().is_none() {
            return;
        }
        tracing::warn!("{}: disconnected", self.name);
        self.stop_polling();
        self.queue.clear_with("transport disconnected");
        self.protocol.lock().pending_lines.clear();
        self.set_state(DeviceState::Disconnected);
        self.events.publish(DeviceEvent::Disconnected);
    }
}

async fn pump_events<T: LineTransport + 'static>(shared: Weak<Shared<T>>, mut events: LineEvents) {
    loop {
        let event = events.recv().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match event {
            Some(TransportEvent::Line(line)) => shared.handle_line(&line),
            Some(TransportEvent::Disconnected) | None => {
                shared.handle_disconnect();
                break;
            }
        }
    }
}

/// Wait for the first status report after opening
async fn first_status<T: LineTransport + 'static>(
    shared: &Shared<T>,
    mut events: broadcast::Receiver<DeviceEvent>,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::Status(_)) => return Ok(()),
            Ok(DeviceEvent::Disconnected) => {
                return Err(ConnectionError::ConnectionLost {
                    reason: "disconnected before first status report".to_string(),
                }
                .into())
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                if shared.protocol.lock().latest_status.is_some() {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => return Err(ConnectionError::Closed.into()),
        }
    }
}

/// GRBL protocol engine over transports opened by `C`
pub struct GrblDevice<C: Connector> {
    connector: C,
    config: GrblDeviceConfig,
    name: String,
    shared: Arc<Shared<C::Transport>>,
    /// Serializes open and close
    lifecycle: tokio::sync::Mutex<()>,
}

impl<C: Connector> GrblDevice<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, GrblDeviceConfig::default())
    }

    pub fn with_config(connector: C, config: GrblDeviceConfig) -> Self {
        let name = connector.identifier();
        let shared = Arc::new(Shared {
            name: name.clone(),
            queue: CommandQueue::new(),
            transport: RwLock::new(None),
            protocol: Mutex::new(ProtocolState::default()),
            events: EventDispatcher::new(config.event_capacity),
            pump: Mutex::new(None),
        });
        Self {
            connector,
            config,
            name,
            shared,
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &GrblDeviceConfig {
        &self.config
    }

    /// Most recently parsed status report
    pub fn latest_status(&self) -> Option<StatusReport> {
        self.shared.protocol.lock().latest_status.clone()
    }

    /// Number of queued commands, including the one in flight
    pub fn queued_commands(&self) -> usize {
        self.shared.queue.size().total()
    }

    fn start_polling(&self) {
        let Some(interval) = self.config.status_poll_interval else {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                if let Err(e) = shared.send_line(STATUS_QUERY, false).await {
                    tracing::debug!("{}: status query failed: {}", shared.name, e);
                }
            });
            return;
        };

        let weak = Arc::downgrade(&self.shared);
        let id = self.shared.queue.add_recurring(
            move || {
                let weak = weak.clone();
                async move {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    if matches!(
                        shared.state(),
                        DeviceState::Resetting | DeviceState::Disconnected
                    ) {
                        return;
                    }
                    if let Err(e) = shared.send_line(STATUS_QUERY, false).await {
                        tracing::trace!("{}: status poll failed: {}", shared.name, e);
                    }
                }
            },
            interval,
        );
        self.shared.protocol.lock().status_poll = Some(id);
    }

    async fn realtime(&self, byte: u8) -> Result<()> {
        let transport = self.shared.transport()?;
        tracing::debug!(">> realtime 0x{:02x}", byte);
        transport.write_realtime(byte).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: Connector> CncDevice for GrblDevice<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.shared.transport.read().is_some()
    }

    fn state(&self) -> DeviceState {
        self.shared.state()
    }

    fn events(&self) -> &EventDispatcher {
        &self.shared.events
    }

    async fn open(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.shared.state() != DeviceState::Disconnected {
            return Err(ControllerError::AlreadyConnected.into());
        }

        self.shared.set_state(DeviceState::Connecting);
        let (transport, events) = match self.connector.connect().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!("{}: {}", self.name, e);
                self.shared.set_state(DeviceState::Disconnected);
                return Err(e.into());
            }
        };

        {
            let mut protocol = self.shared.protocol.lock();
            protocol.pending_lines.clear();
            protocol.latest_status = None;
        }
        *self.shared.transport.write() = Some(Arc::new(transport));

        let status_events = self.shared.events.subscribe();
        let pump = tokio::spawn(pump_events(Arc::downgrade(&self.shared), events));
        *self.shared.pump.lock() = Some(pump);

        self.start_polling();
        first_status(&self.shared, status_events).await?;

        tracing::info!("Connected to {}", self.name);
        self.shared.events.publish(DeviceEvent::Connected);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_open() {
            return Ok(());
        }

        self.shared.stop_polling();
        self.shared.queue.on_idle().await;

        let Some(transport) = self.shared.transport.write().take() else {
            // Lost while draining; already reported
            return Ok(());
        };
        if let Some(pump) = self.shared.pump.lock().take() {
            pump.abort();
        }
        let closed = transport.close().await;

        self.shared.protocol.lock().pending_lines.clear();
        self.shared.set_state(DeviceState::Disconnected);
        tracing::info!("Disconnected from {}", self.name);
        self.shared.events.publish(DeviceEvent::Disconnected);
        closed.map_err(Into::into)
    }

    async fn send_with(&self, line: &str, emit_message: bool) -> Result<String> {
        if line == RESET_COMMAND {
            self.reset().await?;
            return Ok(String::new());
        }
        self.shared.send_line(line, emit_message).await
    }

    async fn home(&self, axes: Option<&[char]>) -> Result<()> {
        match axes {
            Some(axes) if !axes.is_empty() => {
                for axis in axes {
                    self.send(&format!("{}{}", HOME_COMMAND, axis.to_ascii_uppercase()))
                        .await?;
                }
            }
            _ => {
                self.send(HOME_COMMAND).await?;
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let transport = self.shared.transport()?;
        self.shared.begin_reset("reset requested");
        tracing::debug!(">> realtime 0x{:02x}", RESET_BYTE);
        transport.write_realtime(RESET_BYTE).await?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.realtime(FEED_HOLD).await
    }

    async fn resume(&self) -> Result<()> {
        self.realtime(CYCLE_START).await
    }

    async fn sleep(&self) -> Result<()> {
        self.send(SLEEP_COMMAND).await?;
        self.shared.set_state(DeviceState::Sleeping);
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        self.send(UNLOCK_COMMAND).await?;
        if self.shared.state() == DeviceState::Alarm {
            self.shared.set_state(DeviceState::Normal);
        }
        Ok(())
    }
}
