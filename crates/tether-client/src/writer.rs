//! The outbound queue.
//!
//! Every frame of a connection goes through one writer task, so frames
//! reach the transport in the order `send` was called.

use crate::error::SendError;
use crate::handlers::contained;
use crate::socket::Completion;
use crate::transport::Connection;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One queued frame and whoever wants to hear how it went.
pub(crate) struct Outbound {
    pub(crate) discriminator: &'static str,
    pub(crate) frame: Vec<u8>,
    pub(crate) on_complete: Option<Completion>,
}

impl Outbound {
    pub(crate) fn complete(self, result: Result<(), SendError>) {
        if let Some(on_complete) = self.on_complete {
            contained("send completion", || on_complete(result));
        }
    }
}

pub(crate) type Outbox = mpsc::UnboundedSender<Outbound>;

pub(crate) struct Writer {
    task: JoinHandle<()>,
}

impl Writer {
    /// Spawn the writer for `conn`. It exits when `session` is cancelled.
    pub(crate) fn spawn(
        runtime: &Handle,
        conn: Arc<dyn Connection>,
        session: CancellationToken,
    ) -> (Self, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run(conn, rx, session));
        (Self { task }, tx)
    }

    /// Wait for the frame in flight, if any. Frames still queued complete
    /// with `Disconnected`.
    pub(crate) async fn stop(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::warn!("writer task panicked");
            }
        }
    }

    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

async fn run(
    conn: Arc<dyn Connection>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    session: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = session.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(mut outbound) = next else { break };

        let frame = std::mem::take(&mut outbound.frame);
        let result = conn.send(frame).await.map_err(SendError::from);
        if let Err(e) = &result {
            tracing::warn!(discriminator = outbound.discriminator, error = %e, "send failed");
        }
        outbound.complete(result);
    }

    rx.close();
    while let Ok(outbound) = rx.try_recv() {
        outbound.complete(Err(SendError::Disconnected));
    }
}
