//! Serial port transport
//!
//! Direct USB or RS-232 connection to a controller using the `serialport`
//! crate. The port is opened with a short read timeout and polled from a
//! dedicated reader thread; writes run on the blocking pool.
//!
//! Also provides port enumeration filtered to names CNC controllers usually
//! appear under.

use super::{Connector, LineDecoder, LineEvents, LineTransport, TransportEvent};
use async_trait::async_trait;
use grblstream_core::ConnectionError;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default baud rate for GRBL controllers
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    pub description: String,
    pub manufacturer: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// List serial ports that look like CNC controllers
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let description = describe_port(&port.port_type);
            match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                    port_name: port.port_name,
                    description,
                    manufacturer: usb.manufacturer,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    description,
                    manufacturer: None,
                    vid: None,
                    pid: None,
                },
            }
        })
        .collect())
}

/// Check if a port name matches the patterns USB controllers enumerate as
///
/// - Windows: `COM<n>`
/// - Linux: `/dev/ttyUSB*`, `/dev/ttyACM*`
/// - macOS: `/dev/cu.usbserial-*`, `/dev/cu.usbmodem*`
pub fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    ["/dev/ttyUSB", "/dev/ttyACM", "/dev/cu.usbserial-", "/dev/cu.usbmodem"]
        .iter()
        .any(|prefix| port_name.starts_with(prefix))
}

fn describe_port(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Opens [`SerialTransport`]s for one port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    type Transport = SerialTransport;

    async fn connect(&self) -> Result<(SerialTransport, LineEvents), ConnectionError> {
        let port = self.port.clone();
        let baud_rate = self.baud_rate;
        tokio::task::spawn_blocking(move || SerialTransport::open(&port, baud_rate))
            .await
            .map_err(|e| ConnectionError::FailedToOpen {
                target: self.port.clone(),
                reason: e.to_string(),
            })?
    }

    fn identifier(&self) -> String {
        self.port.clone()
    }
}

/// An open serial port
pub struct SerialTransport {
    port_name: String,
    writer: Arc<Mutex<Option<Box<dyn serialport::SerialPort>>>>,
    closed: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Open `port_name` (8N1, no flow control) and start its reader thread
    pub fn open(port_name: &str, baud_rate: u32) -> Result<(Self, LineEvents), ConnectionError> {
        let failed = |e: &dyn std::fmt::Display| {
            tracing::warn!("Failed to open serial port {}: {}", port_name, e);
            ConnectionError::FailedToOpen {
                target: port_name.to_string(),
                reason: e.to_string(),
            }
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| failed(&e))?;
        let reader = port.try_clone().map_err(|e| failed(&e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let thread_closed = closed.clone();
        let thread_name = port_name.to_string();
        std::thread::Builder::new()
            .name(format!("serial-reader {}", port_name))
            .spawn(move || read_loop(&thread_name, reader, tx, thread_closed))
            .map_err(|e| failed(&e))?;

        tracing::info!("Opened serial port {} at {} baud", port_name, baud_rate);
        Ok((
            Self {
                port_name: port_name.to_string(),
                writer: Arc::new(Mutex::new(Some(port))),
                closed,
            },
            rx,
        ))
    }

    async fn write_bytes(&self, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock();
            let port = guard.as_mut().ok_or(ConnectionError::Closed)?;
            port.write_all(&bytes)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| ConnectionError::SerialError {
            reason: e.to_string(),
        })?
    }
}

fn read_loop(
    port_name: &str,
    mut port: Box<dyn serialport::SerialPort>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 1024];

    while !closed.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                for line in decoder.push(&buf[..n]) {
                    if tx.send(TransportEvent::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !closed.load(Ordering::SeqCst) {
                    tracing::warn!("Serial port {} read failed: {}", port_name, e);
                }
                break;
            }
        }
    }

    tracing::debug!("Serial reader for {} stopped", port_name);
    let _ = tx.send(TransportEvent::Disconnected);
}

#[async_trait]
impl LineTransport for SerialTransport {
    async fn write(&self, line: &str) -> Result<(), ConnectionError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write_bytes(bytes).await
    }

    async fn write_realtime(&self, byte: u8) -> Result<(), ConnectionError> {
        self.write_bytes(vec![byte]).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.writer.lock().take().is_some() {
            tracing::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    fn identifier(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
