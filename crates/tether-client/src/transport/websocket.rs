//! WebSocket transport over `tokio-tungstenite`.

use super::{Connection, Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time to wait for a pong before a probe fails.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections.
///
/// UTF-8 frames go out as text messages, anything else as binary. Probes
/// are WebSocket pings, completed by the matching pong.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    probe_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// How long a probe waits for its pong.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, target: &Url) -> Result<Arc<dyn Connection>, TransportError> {
        let (ws, response) = connect_async(target.as_str()).await?;
        tracing::debug!(
            origin = %target.origin().ascii_serialization(),
            status = %response.status(),
            "websocket handshake complete"
        );

        let (sink, stream) = ws.split();
        Ok(Arc::new(WebSocketConnection {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            pongs: parking_lot::Mutex::new(HashMap::new()),
            next_probe: AtomicU64::new(0),
            probe_timeout: self.probe_timeout,
        }))
    }
}

struct WebSocketConnection {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    // probe id -> waiter, completed when the pong carrying that id arrives
    pongs: parking_lot::Mutex<HashMap<u64, oneshot::Sender<()>>>,
    next_probe: AtomicU64,
    probe_timeout: Duration,
}

impl WebSocketConnection {
    fn resolve_pong(&self, data: &[u8]) {
        let Ok(id) = <[u8; 8]>::try_from(data).map(u64::from_be_bytes) else {
            tracing::debug!(len = data.len(), "ignoring unsolicited pong");
            return;
        };
        if let Some(waiter) = self.pongs.lock().remove(&id) {
            let _ = waiter.send(());
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        self.sink.lock().await.send(message).await?;
        Ok(())
    }

    async fn receive(&self) -> Option<Result<Vec<u8>, TransportError>> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = match stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            };

            match message {
                Message::Text(text) => return Some(Ok(text.as_str().as_bytes().to_vec())),
                Message::Binary(data) => return Some(Ok(data.to_vec())),
                Message::Pong(data) => self.resolve_pong(&data),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "peer closed websocket");
                    return None;
                }
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let id = self.next_probe.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pongs.lock().insert(id, tx);

        let ping = Message::Ping(id.to_be_bytes().to_vec().into());
        if let Err(e) = self.sink.lock().await.send(ping).await {
            self.pongs.lock().remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.probe_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            // waiter dropped: the connection was closed underneath us
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pongs.lock().remove(&id);
                Err(TransportError::ProbeTimeout(self.probe_timeout))
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            tracing::debug!(error = %e, "websocket close failed");
        }
        self.pongs.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut stream) = ws.split();
            while let Some(Ok(msg)) = stream.next().await {
                if msg.is_text() || msg.is_binary() {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                } else if msg.is_close() {
                    break;
                } else {
                    // flush the queued pong reply
                    let _ = sink.flush().await;
                }
            }
        });
        Url::parse(&format!("ws://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn text_and_binary_roundtrip() {
        let url = echo_server().await;
        let conn = WebSocketTransport::new().open(&url).await.unwrap();

        conn.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(conn.receive().await.unwrap().unwrap(), b"hello");

        conn.send(vec![0xff, 0x00]).await.unwrap();
        assert_eq!(conn.receive().await.unwrap().unwrap(), vec![0xff, 0x00]);

        conn.close().await;
    }

    #[tokio::test]
    async fn refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/")).unwrap();
        assert!(WebSocketTransport::new().open(&url).await.is_err());
    }

    #[test]
    fn probe_timeout_is_configurable() {
        let transport = WebSocketTransport::new().with_probe_timeout(Duration::from_millis(250));
        assert_eq!(transport.probe_timeout(), Duration::from_millis(250));
        assert_eq!(WebSocketTransport::default().probe_timeout(), DEFAULT_PROBE_TIMEOUT);
    }
}
