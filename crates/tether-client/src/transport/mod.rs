//! Transport layer.
//!
//! The socket only needs a duplex channel of discrete frames with a
//! liveness probe. [`Transport`] opens such a channel; [`Connection`] is
//! the open channel. Frames are opaque bytes; the transport never looks at
//! envelopes.
//!
//! - [`WebSocketTransport`]: WebSocket over `tokio-tungstenite`
//! - [`MemoryTransport`]: in-process, for tests

mod memory;
mod websocket;

pub use memory::MemoryTransport;
pub use websocket::{DEFAULT_PROBE_TIMEOUT, WebSocketTransport};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Opens connections to a target URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a duplex connection to `target`.
    async fn open(&self, target: &Url) -> Result<Arc<dyn Connection>, TransportError>;
}

/// An open duplex connection.
///
/// All methods take `&self`: sends, probes and the single receiver run
/// concurrently.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Transmit one frame.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next inbound frame.
    ///
    /// Returns `None` once the peer has closed the connection or
    /// [`close`](Self::close) has been called. Callers re-arm by calling
    /// again after each result.
    async fn receive(&self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Check that the peer is still there.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Close the connection. Best-effort.
    async fn close(&self);
}

/// A transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("liveness probe timed out after {0:?}")]
    ProbeTimeout(Duration),
    #[error("{0}")]
    Other(String),
}
