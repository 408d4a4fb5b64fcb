//! Byte-stream transports
//!
//! [`StreamTransport`] frames any tokio `AsyncRead + AsyncWrite` stream into
//! lines. It backs the TCP binding and the in-process binding, where the
//! device side of a duplex pipe is handed to a simulator or a test harness.

use super::{Connector, LineDecoder, LineEvents, LineTransport, TransportEvent};
use async_trait::async_trait;
use grblstream_core::ConnectionError;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DUPLEX_BUFFER: usize = 4096;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line transport over an async byte stream
///
/// Closing ends the inbound event channel without a `Disconnected` event;
/// end-of-stream or a read error produces one.
pub struct StreamTransport {
    identifier: String,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    /// Wrap `stream`, spawning its reader task
    pub fn spawn<S>(identifier: impl Into<String>, stream: S) -> (Self, LineEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let identifier = identifier.into();
        let (mut read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();

        let name = identifier.clone();
        let reader = tokio::spawn(async move {
            let mut decoder = LineDecoder::new();
            let mut buf = [0u8; 1024];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!("{}: end of stream", name);
                        break;
                    }
                    Ok(n) => {
                        for line in decoder.push(&buf[..n]) {
                            if tx.send(TransportEvent::Line(line)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("{}: read failed: {}", name, e);
                        break;
                    }
                }
            }
            let _ = tx.send(TransportEvent::Disconnected);
        });

        (
            Self {
                identifier,
                writer: tokio::sync::Mutex::new(Some(Box::new(write_half))),
                reader: Mutex::new(Some(reader)),
            },
            rx,
        )
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(ConnectionError::Closed)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl LineTransport for StreamTransport {
    async fn write(&self, line: &str) -> Result<(), ConnectionError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write_bytes(&bytes).await
    }

    async fn write_realtime(&self, byte: u8) -> Result<(), ConnectionError> {
        self.write_bytes(&[byte]).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("{}: shutdown failed: {}", self.identifier, e);
            }
        }
        Ok(())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// Connects to a controller exposing its serial stream over raw TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = StreamTransport;

    async fn connect(&self) -> Result<(StreamTransport, LineEvents), ConnectionError> {
        let target = self.identifier();
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                tracing::warn!("Failed to connect to {}: {}", target, e);
                ConnectionError::FailedToOpen {
                    target: target.clone(),
                    reason: e.to_string(),
                }
            })?;
        stream.set_nodelay(true)?;
        tracing::info!("Connected to {}", target);
        Ok(StreamTransport::spawn(target, stream))
    }

    fn identifier(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connects to an in-process device over an in-memory duplex pipe
///
/// Every `connect` creates a fresh pipe and delivers its device side on the
/// endpoint channel returned by [`InProcessConnector::new`].
#[derive(Debug, Clone)]
pub struct InProcessConnector {
    name: String,
    endpoints: mpsc::UnboundedSender<DuplexStream>,
}

impl InProcessConnector {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (endpoints, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                endpoints,
            },
            rx,
        )
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    type Transport = StreamTransport;

    async fn connect(&self) -> Result<(StreamTransport, LineEvents), ConnectionError> {
        let (host_side, device_side) = tokio::io::duplex(DUPLEX_BUFFER);
        self.endpoints
            .send(device_side)
            .map_err(|_| ConnectionError::FailedToOpen {
                target: self.name.clone(),
                reason: "no device attached".to_string(),
            })?;
        Ok(StreamTransport::spawn(self.name.clone(), host_side))
    }

    fn identifier(&self) -> String {
        self.name.clone()
    }
}
