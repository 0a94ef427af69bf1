//! The receive loop.
//!
//! Split in two tasks. The reader pulls frames off the connection and
//! queues them, re-arming immediately; the dispatcher unwraps envelopes
//! and runs listeners. A handler that blocks or panics therefore never
//! stops frames from being read.

use crate::config::Dispatch;
use crate::handlers::Dropped;
use crate::socket::Shared;
use crate::transport::{Connection, TransportError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tether_core::{Codec, Envelope};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

type Inbound = Result<Vec<u8>, TransportError>;

// deliveries started under `Dispatch::Spawn`
type Spawned = Arc<Mutex<JoinSet<()>>>;

pub(crate) struct Receiver {
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    spawned: Spawned,
}

impl Receiver {
    /// Spawn the reader and dispatcher for `conn`.
    ///
    /// Both stop when `session` is cancelled. If the peer ends the stream,
    /// the reader releases the connection and cancels `keepalive`; the
    /// dispatcher finishes what is queued and exits.
    pub(crate) fn spawn<C: Codec>(
        runtime: &Handle,
        conn: Arc<dyn Connection>,
        shared: Arc<Shared<C>>,
        dispatch: Dispatch,
        session: CancellationToken,
        keepalive: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = Spawned::default();
        let reader = runtime.spawn(read(conn, tx, shared.clone(), session.clone(), keepalive));
        let dispatcher = runtime.spawn(dispatch_loop(
            rx,
            shared,
            dispatch,
            spawned.clone(),
            session,
        ));
        Self {
            reader,
            dispatcher,
            spawned,
        }
    }

    /// Wait for the reader to exit; the dispatcher is aborted rather than
    /// joined since it may be stuck in a handler.
    ///
    /// The session token must already be cancelled. Spawned deliveries that
    /// have not started yet never run.
    pub(crate) async fn stop(self) {
        self.dispatcher.abort();
        self.spawned.lock().abort_all();
        if let Err(e) = self.reader.await {
            if e.is_panic() {
                tracing::warn!("reader task panicked");
            }
        }
    }

    pub(crate) fn abort(self) {
        self.dispatcher.abort();
        self.spawned.lock().abort_all();
        self.reader.abort();
    }
}

async fn read<C: Codec>(
    conn: Arc<dyn Connection>,
    tx: mpsc::UnboundedSender<Inbound>,
    shared: Arc<Shared<C>>,
    session: CancellationToken,
    keepalive: CancellationToken,
) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            () = session.cancelled() => return,
            next = conn.receive() => next,
        };

        match next {
            Some(item) => {
                if tx.send(item).is_err() {
                    break "dispatcher stopped";
                }
            }
            None => break "connection closed by peer",
        }
    };

    // Anything but a disconnect leaves the socket unable to receive.
    if shared.release(&conn) {
        tracing::info!(reason, "connection lost");
    }
    keepalive.cancel();
}

async fn dispatch_loop<C: Codec>(
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    shared: Arc<Shared<C>>,
    dispatch: Dispatch,
    spawned: Spawned,
    session: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = session.cancelled() => return,
            item = rx.recv() => item,
        };
        let Some(item) = item else { return };

        match item {
            Err(e) => {
                tracing::warn!(error = %e, "receive failed");
                shared.handlers.message_error(&e);
            }
            Ok(frame) => match dispatch {
                Dispatch::Inline => deliver(&shared, &frame),
                Dispatch::Spawn => {
                    let mut spawned = spawned.lock();
                    // checked under the lock `stop` aborts through
                    if session.is_cancelled() {
                        return;
                    }
                    while spawned.try_join_next().is_some() {}
                    let shared = shared.clone();
                    spawned.spawn(async move { deliver(&shared, &frame) });
                }
            },
        }
    }
}

/// Route one frame to its listener. Every failure here is a silent drop.
fn deliver<C: Codec>(shared: &Shared<C>, frame: &[u8]) {
    let envelope = match Envelope::unwrap(frame, shared.codec.as_ref()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, len = frame.len(), "not an envelope");
            shared.handlers.dropped(Dropped::Malformed);
            return;
        }
    };

    let Some(listener) = shared.registry.lookup(&envelope.discriminator) else {
        shared.handlers.dropped(Dropped::Unrouted {
            discriminator: envelope.discriminator,
        });
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| listener(&envelope.payload))) {
        Ok(Ok(())) => {
            tracing::trace!(discriminator = %envelope.discriminator, "delivered");
        }
        Ok(Err(e)) => {
            tracing::debug!(discriminator = %envelope.discriminator, error = %e, "payload mismatch");
            shared.handlers.dropped(Dropped::Mismatched {
                discriminator: envelope.discriminator,
            });
        }
        Err(_) => {
            tracing::warn!(discriminator = %envelope.discriminator, "message handler panicked");
        }
    }
}
