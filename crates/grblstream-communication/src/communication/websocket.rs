//! WebSocket transport
//!
//! Connects to controllers that bridge their serial stream over a WebSocket
//! (FluidNC and other ESP32 firmwares). The connection negotiates the
//! `arduino` subprotocol. Controller output arrives as binary frames; the
//! server's `PING` text frames feed a keepalive watchdog that drops the
//! connection once they stop.

use super::{Connector, KeepaliveWatchdog, LineDecoder, LineEvents, LineTransport, TransportEvent};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use grblstream_core::ConnectionError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Subprotocol requested during the handshake
pub const SUBPROTOCOL: &str = "arduino";

/// Default keepalive window
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>>;

fn ws_error(e: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::WebSocketError {
        reason: e.to_string(),
    }
}

/// Opens [`WebSocketTransport`]s to one URL
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    keepalive_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
        }
    }

    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<(WebSocketTransport, LineEvents), ConnectionError> {
        let failed = |reason: String| {
            tracing::warn!("Failed to connect to {}: {}", self.url, reason);
            ConnectionError::FailedToOpen {
                target: self.url.clone(),
                reason,
            }
        };

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| failed(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        tracing::info!("WebSocket connecting... {}", self.url);
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| failed(e.to_string()))?;
        tracing::info!("WebSocket connected: {}", self.url);

        Ok(WebSocketTransport::spawn(
            self.url.clone(),
            stream,
            self.keepalive_timeout,
        ))
    }

    fn identifier(&self) -> String {
        self.url.clone()
    }
}

/// An open WebSocket connection
pub struct WebSocketTransport {
    url: String,
    sink: WsSink,
    reader: Mutex<Option<JoinHandle<()>>>,
    watchdog: Arc<KeepaliveWatchdog>,
}

impl WebSocketTransport {
    fn spawn(url: String, stream: WsStream, keepalive_timeout: Duration) -> (Self, LineEvents) {
        let (sink, source) = stream.split();
        let sink: WsSink = Arc::new(tokio::sync::Mutex::new(Some(sink)));
        let watchdog = Arc::new(KeepaliveWatchdog::new(keepalive_timeout));
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            url.clone(),
            source,
            sink.clone(),
            watchdog.clone(),
            tx,
        ));

        (
            Self {
                url,
                sink,
                reader: Mutex::new(Some(reader)),
                watchdog,
            },
            rx,
        )
    }

    /// Keepalive state of this connection
    pub fn watchdog(&self) -> &KeepaliveWatchdog {
        &self.watchdog
    }

    async fn send(&self, message: Message) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(ConnectionError::Closed)?;
        sink.send(message).await.map_err(ws_error)
    }
}

/// Feed a binary frame, returning the non-empty lines it completes
///
/// A line may span several frames; its tail stays in `decoder` until the
/// frame carrying the newline arrives.
fn frame_lines(decoder: &mut LineDecoder, data: &[u8]) -> Vec<String> {
    decoder
        .push(data)
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

async fn read_loop(
    url: String,
    mut source: SplitStream<WsStream>,
    sink: WsSink,
    watchdog: Arc<KeepaliveWatchdog>,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut decoder = LineDecoder::new();
    loop {
        tokio::select! {
            message = source.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    for line in frame_lines(&mut decoder, &data) {
                        if tx.send(TransportEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if text.starts_with("PING") {
                        watchdog.heartbeat();
                    } else {
                        tracing::trace!("{}: ignoring text frame {:?}", url, text);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("{}: closed by peer", url);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("{}: {}", url, e);
                    break;
                }
            },
            _ = watchdog.expired() => {
                tracing::warn!("Ping timeout: {}", url);
                if let Some(mut sink) = sink.lock().await.take() {
                    let _ = sink.close().await;
                }
                break;
            }
        }
    }

    let _ = tx.send(TransportEvent::Disconnected);
}

#[async_trait]
impl LineTransport for WebSocketTransport {
    async fn write(&self, line: &str) -> Result<(), ConnectionError> {
        self.send(Message::Text(format!("{}\n", line))).await
    }

    async fn write_realtime(&self, byte: u8) -> Result<(), ConnectionError> {
        self.send(Message::Binary(vec![byte])).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await.map_err(ws_error)?;
        }
        Ok(())
    }

    fn identifier(&self) -> &str {
        &self.url
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
