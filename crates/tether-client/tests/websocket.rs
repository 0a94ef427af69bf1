//! Socket over a real WebSocket, against a local echo server.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_client::{BasicQuery, Message, Socket, SocketConfig, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Greeting {
    text: String,
}

impl Message for Greeting {
    const DISCRIMINATOR: &'static str = "greeting";
}

/// Accept one connection, report its handshake query, echo data frames.
async fn echo_server() -> (String, oneshot::Receiver<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (query_tx, query_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut query = None;
        let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_owned);
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, capture)
            .await
            .unwrap();
        let _ = query_tx.send(query);

        let (mut sink, mut stream) = ws.split();
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                tungstenite::Message::Text(_) | tungstenite::Message::Binary(_) => {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                tungstenite::Message::Close(_) => break,
                _ => {
                    let _ = sink.flush().await;
                }
            }
        }
    });

    (format!("ws://{addr}/"), query_rx)
}

#[tokio::test]
async fn echo_round_trip() {
    let (url, query) = echo_server().await;
    let socket = Socket::new(url, WebSocketTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    socket.on(move |greeting: Greeting| {
        let _ = tx.send(greeting);
    });

    let handshake = BasicQuery::new("u1".parse().unwrap()).with("name", "Ken");
    socket.connect(&handshake).await.unwrap();

    let raw = query.await.unwrap().expect("handshake query missing");
    let data = url::form_urlencoded::parse(raw.as_bytes())
        .find(|(k, _)| k == "data")
        .map(|(_, v)| v.into_owned());
    assert_eq!(data.as_deref(), Some(r#"{"id":"u1","name":"Ken"}"#));

    let sent = Greeting { text: "hi".into() };
    socket.send_async(&sent).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, sent);

    socket.disconnect().await;
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn probes_are_answered() {
    let (url, _query) = echo_server().await;
    let config = SocketConfig::default().keepalive_interval(Duration::from_millis(50));
    let transport = WebSocketTransport::new().with_probe_timeout(Duration::from_secs(2));
    let socket = Socket::with_config(url, transport, config);

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    socket.on_ping_error(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    socket
        .connect(&BasicQuery::new("u1".parse().unwrap()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert!(socket.is_connected());

    socket.disconnect().await;
}
