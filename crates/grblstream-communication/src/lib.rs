//! # grblstream Communication
//!
//! Line transports and the GRBL protocol engine for grblstream.
//! Supports Serial/USB, TCP/IP, WebSocket and in-process connections, all
//! driven through a single-in-flight command queue.

pub mod communication;
pub mod firmware;

pub use communication::{
    serial::{list_ports, SerialPortInfo, DEFAULT_BAUD_RATE},
    websocket::DEFAULT_KEEPALIVE_TIMEOUT,
    CommandQueue, Completion, Connector, InProcessConnector, KeepaliveWatchdog, LineDecoder,
    LineEvents, LineTransport, QueueSize, RecurringTaskId, SerialConnector, SerialTransport,
    Settle, StreamTransport, TcpConnector, TransportEvent, WebSocketConnector, WebSocketTransport,
};

pub use firmware::grbl::{
    classify_line, parse_log, parse_status, GrblDevice, GrblDeviceConfig, GrblLine,
    DEFAULT_STATUS_POLL_INTERVAL,
};
