//! The connection controller.

use crate::config::SocketConfig;
use crate::error::{ConnectError, SendError};
use crate::handlers::{Dropped, Handlers};
use crate::keepalive::Keepalive;
use crate::receiver::Receiver;
use crate::registry::{Listener, ListenerRegistry};
use crate::transport::{Connection, Transport, TransportError};
use crate::writer::{Outbound, Outbox, Writer};
use parking_lot::RwLock;
use std::sync::Arc;
use tether_core::{
    Codec, CodecError, ConnectionTarget, Envelope, HANDSHAKE_PARAM, JsonCodec, Message, Query,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Callback receiving the outcome of [`Socket::send`].
pub type Completion = Box<dyn FnOnce(Result<(), SendError>) + Send + 'static>;

/// A typed publish/subscribe client over one duplex connection.
///
/// Listeners and error handlers are registered on the socket, not on a
/// connection: they survive `disconnect` and apply again after the next
/// `connect`. Dropping the socket disconnects it.
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
/// use tether_client::{Socket, WebSocketTransport};
/// use tether_core::{BasicQuery, Message};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Greeting {
///     text: String,
/// }
///
/// impl Message for Greeting {
///     const DISCRIMINATOR: &'static str = "greeting";
/// }
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let socket = Socket::new("ws://localhost:8001/", WebSocketTransport::new());
/// socket.on(|greeting: Greeting| println!("{}", greeting.text));
/// socket.connect(&BasicQuery::new("u1".parse()?)).await?;
/// socket.send_async(&Greeting { text: "hi".into() }).await?;
/// # Ok(())
/// # }
/// ```
pub struct Socket<C: Codec = JsonCodec> {
    target: ConnectionTarget,
    transport: Arc<dyn Transport>,
    config: SocketConfig,
    shared: Arc<Shared<C>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

/// State reachable from the socket's background tasks.
pub(crate) struct Shared<C> {
    pub(crate) codec: Arc<C>,
    pub(crate) registry: ListenerRegistry,
    pub(crate) handlers: Arc<Handlers>,
    // Some iff connected
    link: RwLock<Option<Link>>,
}

#[derive(Clone)]
struct Link {
    conn: Arc<dyn Connection>,
    outbox: Outbox,
}

impl<C> Shared<C> {
    fn link(&self) -> Option<Link> {
        self.link.read().clone()
    }

    /// Forget `conn` if it is still the current connection.
    pub(crate) fn release(&self, conn: &Arc<dyn Connection>) -> bool {
        let mut link = self.link.write();
        let current = link
            .as_ref()
            .is_some_and(|l| std::ptr::addr_eq(Arc::as_ptr(&l.conn), Arc::as_ptr(conn)));
        if current {
            *link = None;
        }
        current
    }
}

/// Background machinery of one connection.
struct Session {
    conn: Arc<dyn Connection>,
    runtime: Handle,
    cancel: CancellationToken,
    keepalive: Keepalive,
    receiver: Receiver,
    writer: Writer,
}

impl Session {
    async fn shutdown(self) {
        self.cancel.cancel();
        self.keepalive.stop().await;
        self.receiver.stop().await;
        self.writer.stop().await;
        self.conn.close().await;
    }

    /// Teardown without awaiting, for `Drop`.
    fn abort(self) {
        self.cancel.cancel();
        self.keepalive.abort();
        self.receiver.abort();
        self.writer.abort();
        let conn = self.conn;
        self.runtime.spawn(async move { conn.close().await });
    }
}

impl Socket<JsonCodec> {
    /// Create an unconnected socket with the default config.
    pub fn new(target: impl Into<ConnectionTarget>, transport: impl Transport) -> Self {
        Self::with_codec(target, transport, SocketConfig::default(), JsonCodec)
    }

    pub fn with_config(
        target: impl Into<ConnectionTarget>,
        transport: impl Transport,
        config: SocketConfig,
    ) -> Self {
        Self::with_codec(target, transport, config, JsonCodec)
    }

    /// Create a socket and connect it.
    pub async fn connected<Q: Query>(
        target: impl Into<ConnectionTarget>,
        transport: impl Transport,
        query: &Q,
    ) -> Result<Self, ConnectError> {
        let socket = Self::new(target, transport);
        socket.connect(query).await?;
        Ok(socket)
    }
}

impl<C: Codec> Socket<C> {
    pub fn with_codec(
        target: impl Into<ConnectionTarget>,
        transport: impl Transport,
        config: SocketConfig,
        codec: C,
    ) -> Self {
        Self {
            target: target.into(),
            transport: Arc::new(transport),
            config,
            shared: Arc::new(Shared {
                codec: Arc::new(codec),
                registry: ListenerRegistry::new(),
                handlers: Arc::new(Handlers::default()),
                link: RwLock::new(None),
            }),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.read().is_some()
    }

    /// Connect, sending `query` as handshake data.
    ///
    /// Does nothing if already connected. A socket can be connected again
    /// after `disconnect` or after the peer closed the connection.
    pub async fn connect<Q: Query>(&self, query: &Q) -> Result<(), ConnectError> {
        let mut session = self.session.lock().await;
        if self.is_connected() {
            tracing::debug!(address = %self.target, "already connected");
            return Ok(());
        }
        // left behind when the peer hung up
        if let Some(stale) = session.take() {
            stale.shutdown().await;
        }

        let data = self
            .shared
            .codec
            .encode(query)
            .map_err(ConnectError::InvalidQuery)?;
        let url = self.target.resolve(HANDSHAKE_PARAM, &data)?;
        let conn = self.transport.open(&url).await?;

        *session = Some(self.start(conn));
        tracing::info!(address = %self.target, client_id = %query.client_id(), "connected");
        Ok(())
    }

    fn start(&self, conn: Arc<dyn Connection>) -> Session {
        let runtime = Handle::current();
        let cancel = CancellationToken::new();
        let keepalive_cancel = cancel.child_token();

        let (writer, outbox) = Writer::spawn(&runtime, conn.clone(), cancel.clone());
        *self.shared.link.write() = Some(Link {
            conn: conn.clone(),
            outbox,
        });

        let receiver = Receiver::spawn(
            &runtime,
            conn.clone(),
            self.shared.clone(),
            self.config.dispatch,
            cancel.clone(),
            keepalive_cancel.clone(),
        );
        let keepalive = Keepalive::start(
            &runtime,
            conn.clone(),
            self.config.keepalive_interval,
            self.shared.handlers.clone(),
            keepalive_cancel,
        );

        Session {
            conn,
            runtime,
            cancel,
            keepalive,
            receiver,
            writer,
        }
    }

    /// Stop the keepalive and receive loops and close the connection.
    ///
    /// Safe to call any number of times; only the first call after a
    /// connect does anything.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            return;
        };
        self.shared.link.write().take();
        active.shutdown().await;
        tracing::info!(address = %self.target, "disconnected");
    }

    /// Send `message`, reporting the outcome to `on_complete`.
    ///
    /// Returns immediately. Serialization errors and `Disconnected` are
    /// reported before this returns; the transport's result arrives later.
    /// Frames reach the transport in the order `send` and `send_async` were
    /// called.
    pub fn send<M: Message>(&self, message: &M, on_complete: Option<Completion>) {
        let outbound = Outbound {
            discriminator: M::DISCRIMINATOR,
            frame: Vec::new(),
            on_complete,
        };
        self.enqueue(message, outbound);
    }

    /// Send `message` and wait for the transport to accept it.
    pub async fn send_async<M: Message>(&self, message: &M) -> Result<(), SendError> {
        let (tx, rx) = oneshot::channel();
        let outbound = Outbound {
            discriminator: M::DISCRIMINATOR,
            frame: Vec::new(),
            on_complete: Some(Box::new(move |result: Result<(), SendError>| {
                let _ = tx.send(result);
            })),
        };
        self.enqueue(message, outbound);
        rx.await.unwrap_or(Err(SendError::Disconnected))
    }

    /// Encode `message` into `outbound` and queue it on the current
    /// connection. Failures complete `outbound` before returning.
    fn enqueue<M: Message>(&self, message: &M, mut outbound: Outbound) {
        let link = match self.prepare(message, &mut outbound) {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(discriminator = M::DISCRIMINATOR, error = %e, "send rejected");
                outbound.complete(Err(e));
                return;
            }
        };
        // the writer is gone once the session is torn down
        if let Err(rejected) = link.outbox.send(outbound) {
            rejected.0.complete(Err(SendError::Disconnected));
        }
    }

    fn prepare<M: Message>(&self, message: &M, outbound: &mut Outbound) -> Result<Link, SendError> {
        let link = self.shared.link().ok_or(SendError::Disconnected)?;
        let codec = self.shared.codec.as_ref();
        outbound.frame = Envelope::seal(message, codec)?.to_bytes(codec)?;
        Ok(link)
    }

    /// Handle every inbound `M`, replacing any handler already registered
    /// for `M::DISCRIMINATOR`.
    pub fn on<M, F>(&self, handler: F)
    where
        M: Message,
        F: Fn(M) + Send + Sync + 'static,
    {
        let codec = self.shared.codec.clone();
        let listener: Listener = Arc::new(move |payload: &str| -> Result<(), CodecError> {
            let message: M = codec.decode(payload)?;
            handler(message);
            Ok(())
        });
        if self.shared.registry.register(M::DISCRIMINATOR, listener) {
            tracing::debug!(discriminator = M::DISCRIMINATOR, "replaced listener");
        }
    }

    /// Called for transport failures while receiving.
    pub fn on_message_error<F>(&self, handler: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.shared.handlers.set_message_error(Arc::new(handler));
    }

    /// Called when a liveness probe fails.
    pub fn on_ping_error<F>(&self, handler: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.shared.handlers.set_ping_error(Arc::new(handler));
    }

    /// Called whenever an inbound frame is discarded. Purely diagnostic:
    /// dropping frames is not an error.
    pub fn on_drop<F>(&self, handler: F)
    where
        F: Fn(&Dropped) + Send + Sync + 'static,
    {
        self.shared.handlers.set_dropped(Arc::new(handler));
    }
}

impl<C: Codec> Drop for Socket<C> {
    fn drop(&mut self) {
        self.shared.link.write().take();
        if let Some(session) = self.session.get_mut().take() {
            session.abort();
        }
    }
}
