//! Tests for communication::websocket against a local server

use futures_util::{SinkExt, StreamExt};
use grblstream_communication::{Connector, LineTransport, TransportEvent, WebSocketConnector};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

/// Accepts one client, runs `script` on it and reports received text frames
async fn serve_once<F, Fut>(script: F) -> (String, mpsc::UnboundedReceiver<String>)
where
    F: FnOnce(
            tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
            mpsc::UnboundedSender<String>,
        ) -> Fut
        + Send
        + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let negotiate = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let offered = request
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if offered.as_deref() == Some("arduino") {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("arduino"));
            }
            Ok(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(tcp, negotiate)
            .await
            .unwrap();
        script(ws, tx).await;
    });

    (url, rx)
}

#[tokio::test]
async fn test_binary_frames_become_lines() {
    let (url, mut received) = serve_once(|mut ws, tx| async move {
        ws.send(Message::Text("PING:60000:60000".to_string()))
            .await
            .unwrap();
        ws.send(Message::Binary(b"Grbl 3.7 [FluidNC]\r\nok\r\n".to_vec()))
            .await
            .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = tx.send(text);
            }
        }
    })
    .await;

    let connector = WebSocketConnector::new(url.clone());
    assert_eq!(connector.identifier(), url);
    let (transport, mut events) = connector.connect().await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Line("Grbl 3.7 [FluidNC]".to_string()))
    );
    assert_eq!(events.recv().await, Some(TransportEvent::Line("ok".to_string())));
    assert!(transport.watchdog().is_armed());

    transport.write("$I").await.unwrap();
    assert_eq!(received.recv().await.as_deref(), Some("$I\n"));

    transport.close().await.unwrap();
    assert!(transport.write("$I").await.is_err());
}

#[tokio::test]
async fn test_line_split_across_frames_is_reassembled() {
    let (url, _received) = serve_once(|mut ws, _tx| async move {
        ws.send(Message::Binary(b"<Idle|MPos:1.000".to_vec()))
            .await
            .unwrap();
        ws.send(Message::Binary(b",2.000,3.000|FS:0,0>\r\nok\r\n".to_vec()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let (_transport, mut events) = WebSocketConnector::new(url).connect().await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Line(
            "<Idle|MPos:1.000,2.000,3.000|FS:0,0>".to_string()
        ))
    );
    assert_eq!(events.recv().await, Some(TransportEvent::Line("ok".to_string())));
}

#[tokio::test]
async fn test_keepalive_timeout_disconnects() {
    let (url, _received) = serve_once(|mut ws, _tx| async move {
        ws.send(Message::Text("PING:60000:60000".to_string()))
            .await
            .unwrap();
        // Stay connected but silent
        while ws.next().await.is_some() {}
    })
    .await;

    let connector =
        WebSocketConnector::new(url).with_keepalive_timeout(Duration::from_millis(100));
    let (_transport, mut events) = connector.connect().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("watchdog never fired");
    assert_eq!(event, Some(TransportEvent::Disconnected));
}

#[tokio::test]
async fn test_watchdog_unarmed_without_ping() {
    let (url, _received) = serve_once(|mut ws, _tx| async move {
        while ws.next().await.is_some() {}
    })
    .await;

    let connector =
        WebSocketConnector::new(url).with_keepalive_timeout(Duration::from_millis(50));
    let (transport, mut events) = connector.connect().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert!(waited.is_err(), "disconnected without a ping");
    assert!(!transport.watchdog().is_armed());
}

#[tokio::test]
async fn test_server_close_reports_disconnect() {
    let (url, _received) = serve_once(|mut ws, _tx| async move {
        ws.close(None).await.unwrap();
    })
    .await;

    let (_transport, mut events) = WebSocketConnector::new(url).connect().await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(TransportEvent::Disconnected));
}
