//! Communication module
//!
//! Line transports and the command queue that serializes traffic over them.
//!
//! A transport carries newline-terminated text in both directions plus
//! single realtime bytes outbound. Incoming lines and the disconnect
//! notification are delivered on an unbounded channel handed out when the
//! transport is connected, so the consumer sees them strictly in arrival
//! order.

pub mod keepalive;
pub mod lines;
pub mod queue;
pub mod serial;
pub mod stream;
pub mod websocket;

use async_trait::async_trait;
use grblstream_core::ConnectionError;
use tokio::sync::mpsc;

pub use keepalive::KeepaliveWatchdog;
pub use lines::LineDecoder;
pub use queue::{CommandQueue, Completion, QueueSize, RecurringTaskId, Settle};
pub use serial::{is_valid_cnc_port, list_ports, SerialConnector, SerialTransport};
pub use stream::{InProcessConnector, StreamTransport, TcpConnector};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Inbound traffic from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete line, without its terminator
    Line(String),
    /// The channel was lost or closed; no further events follow
    Disconnected,
}

/// Receiving end of a transport's inbound traffic
pub type LineEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending end used by transport implementations
pub type LineEventSender = mpsc::UnboundedSender<TransportEvent>;

/// A connected, line-oriented duplex channel to a controller
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Write `line` followed by a newline
    async fn write(&self, line: &str) -> Result<(), ConnectionError>;

    /// Write a single realtime byte with no terminator
    async fn write_realtime(&self, byte: u8) -> Result<(), ConnectionError>;

    /// Close the channel
    async fn close(&self) -> Result<(), ConnectionError>;

    /// Port name, address or URL
    fn identifier(&self) -> &str;
}

#[async_trait]
impl<T: LineTransport + ?Sized> LineTransport for Box<T> {
    async fn write(&self, line: &str) -> Result<(), ConnectionError> {
        (**self).write(line).await
    }

    async fn write_realtime(&self, byte: u8) -> Result<(), ConnectionError> {
        (**self).write_realtime(byte).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        (**self).close().await
    }

    fn identifier(&self) -> &str {
        (**self).identifier()
    }
}

/// Factory for transports of one kind
///
/// A connector describes where to connect; every successful `connect` yields
/// a fresh transport and its inbound event channel.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: LineTransport + 'static;

    /// Open a new transport
    async fn connect(&self) -> Result<(Self::Transport, LineEvents), ConnectionError>;

    /// Port name, address or URL
    fn identifier(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_boxed_transport_delegates() {
        let (connector, mut endpoints) = InProcessConnector::new("virtual");
        let (transport, _events) = connector.connect().await.unwrap();
        let boxed: Box<dyn LineTransport> = Box::new(transport);
        assert_eq!(boxed.identifier(), "virtual");

        let mut device_side = endpoints.recv().await.unwrap();
        boxed.write("G0 X1").await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 6];
        device_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"G0 X1\n");
    }
}
