//! Periodic liveness probes.

use crate::handlers::Handlers;
use crate::transport::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running probe loop.
///
/// The loop owns nothing but a connection handle and the handler slots;
/// cancelling its token is the only way to stop it.
pub(crate) struct Keepalive {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Keepalive {
    /// Start probing `conn` every `interval`, first probe one interval from
    /// now.
    pub(crate) fn start(
        runtime: &Handle,
        conn: Arc<dyn Connection>,
        interval: Duration,
        handlers: Arc<Handlers>,
        cancel: CancellationToken,
    ) -> Self {
        let task = runtime.spawn(run(conn, interval, handlers, cancel.clone()));
        Self { cancel, task }
    }

    /// Stop the loop and wait for it to exit. No tick fires afterwards.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::warn!("keepalive task panicked");
            }
        }
    }

    /// Stop the loop without waiting.
    pub(crate) fn abort(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

async fn run(
    conn: Arc<dyn Connection>,
    interval: Duration,
    handlers: Arc<Handlers>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::trace!("sending liveness probe");
        let conn = conn.clone();
        let handlers = handlers.clone();
        // a slow probe must not hold up the next tick
        tokio::spawn(async move {
            if let Err(e) = conn.probe().await {
                tracing::warn!(error = %e, "liveness probe failed");
                handlers.ping_error(&e);
            }
        });
    }

    tracing::debug!("keepalive stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, Transport, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    async fn open(transport: &MemoryTransport) -> Arc<dyn Connection> {
        transport
            .open(&Url::parse("ws://memory/").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn one_probe_per_interval() {
        let transport = MemoryTransport::new();
        let conn = open(&transport).await;
        let keepalive = Keepalive::start(
            &Handle::current(),
            conn,
            Duration::from_secs(10),
            Arc::new(Handlers::default()),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.probe_count(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.probe_count(), 3);

        keepalive.stop().await;
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(transport.probe_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_reach_ping_handler() {
        let transport = MemoryTransport::new();
        transport.fail_probes(true);
        let conn = open(&transport).await;

        let failures = Arc::new(AtomicUsize::new(0));
        let handlers = Arc::new(Handlers::default());
        let counter = failures.clone();
        handlers.set_ping_error(Arc::new(move |e: &TransportError| {
            assert!(matches!(e, TransportError::Other(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let cancel = CancellationToken::new();
        let _keepalive = Keepalive::start(
            &Handle::current(),
            conn,
            Duration::from_secs(1),
            handlers,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 2);

        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }
}
