//! In-process transport.
//!
//! Nothing leaves the process: frames sent by the socket are recorded, and
//! inbound frames, receive failures and hang-ups are injected by the
//! owner. Clones share state, so keep one clone and hand another to the
//! socket.

use super::{Connection, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

type Inbound = Result<Vec<u8>, TransportError>;

/// Transport that records outbound traffic and replays injected input.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<State>,
}

#[derive(Default)]
struct State {
    opened: Mutex<Vec<Url>>,
    sent: Mutex<Vec<Vec<u8>>>,
    probes: AtomicUsize,
    closes: AtomicUsize,
    refuse: AtomicBool,
    fail_probes: AtomicBool,
    fail_sends: AtomicBool,
    // inbound side of the most recently opened connection
    inbound: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent probes fail.
    pub fn fail_probes(&self, fail: bool) {
        self.state.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Queue a frame for the open connection. Returns `false` if no
    /// connection is open.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.push(Ok(frame.into()))
    }

    /// Queue a receive failure for the open connection.
    pub fn deliver_error(&self, error: TransportError) -> bool {
        self.push(Err(error))
    }

    /// End the inbound stream as if the peer closed the connection.
    pub fn hang_up(&self) {
        self.state.inbound.lock().take();
    }

    /// Every URL `open` was called with, in order.
    pub fn opened(&self) -> Vec<Url> {
        self.state.opened.lock().clone()
    }

    /// Every frame sent, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    fn push(&self, item: Inbound) -> bool {
        match self.state.inbound.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, target: &Url) -> Result<Arc<dyn Connection>, TransportError> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(target.to_string()));
        }
        self.state.opened.lock().push(target.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.inbound.lock() = Some(tx);
        Ok(Arc::new(MemoryConnection {
            state: self.state.clone(),
            inbound: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    state: Arc<State>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    closed: CancellationToken,
    closing: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Other("send failed".into()));
        }
        self.state.sent.lock().push(frame);
        Ok(())
    }

    async fn receive(&self) -> Option<Result<Vec<u8>, TransportError>> {
        tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            item = async { self.inbound.lock().await.recv().await } => item,
        }
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.state.fail_probes.load(Ordering::SeqCst) {
            return Err(TransportError::Other("probe failed".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("ws://memory/").unwrap()
    }

    #[tokio::test]
    async fn records_and_replays() {
        let transport = MemoryTransport::new();
        assert!(!transport.deliver(b"early".to_vec()));

        let conn = transport.open(&url()).await.unwrap();
        conn.send(b"out".to_vec()).await.unwrap();
        assert_eq!(transport.sent(), vec![b"out".to_vec()]);
        assert_eq!(transport.opened(), vec![url()]);

        assert!(transport.deliver(b"in".to_vec()));
        assert_eq!(conn.receive().await.unwrap().unwrap(), b"in");

        transport.deliver_error(TransportError::Other("boom".into()));
        assert!(conn.receive().await.unwrap().is_err());

        transport.hang_up();
        assert!(conn.receive().await.is_none());
    }

    #[tokio::test]
    async fn close_counts_once() {
        let transport = MemoryTransport::new();
        let conn = transport.open(&url()).await.unwrap();
        conn.close().await;
        conn.close().await;
        assert_eq!(transport.close_count(), 1);
        assert!(conn.send(b"late".to_vec()).await.is_err());
        assert!(conn.receive().await.is_none());
    }

    #[tokio::test]
    async fn refuse_and_fail_probes() {
        let transport = MemoryTransport::new();
        transport.refuse_connections(true);
        assert!(matches!(
            transport.open(&url()).await,
            Err(TransportError::Refused(_))
        ));

        transport.refuse_connections(false);
        let conn = transport.open(&url()).await.unwrap();
        conn.probe().await.unwrap();
        transport.fail_probes(true);
        assert!(conn.probe().await.is_err());
        assert_eq!(transport.probe_count(), 2);
    }
}
