//! Error and diagnostic handler slots.
//!
//! Each slot holds at most one handler; setting it again replaces the old
//! one. Handlers are cloned out of the slot before being called, so a
//! handler may replace itself. A panicking handler is logged and otherwise
//! ignored.

use crate::transport::TransportError;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub(crate) type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;
pub(crate) type DropHandler = Arc<dyn Fn(&Dropped) + Send + Sync>;

/// Why an inbound frame was discarded without reaching a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dropped {
    /// The frame was not a valid envelope.
    Malformed,
    /// No listener is registered for the discriminator.
    Unrouted { discriminator: String },
    /// The payload did not decode as the listener's message type.
    Mismatched { discriminator: String },
}

#[derive(Default)]
pub(crate) struct Handlers {
    message_error: RwLock<Option<ErrorHandler>>,
    ping_error: RwLock<Option<ErrorHandler>>,
    dropped: RwLock<Option<DropHandler>>,
}

impl Handlers {
    pub(crate) fn set_message_error(&self, handler: ErrorHandler) {
        *self.message_error.write() = Some(handler);
    }

    pub(crate) fn set_ping_error(&self, handler: ErrorHandler) {
        *self.ping_error.write() = Some(handler);
    }

    pub(crate) fn set_dropped(&self, handler: DropHandler) {
        *self.dropped.write() = Some(handler);
    }

    pub(crate) fn message_error(&self, error: &TransportError) {
        let handler = self.message_error.read().clone();
        if let Some(handler) = handler {
            contained("message error", || handler(error));
        }
    }

    pub(crate) fn ping_error(&self, error: &TransportError) {
        let handler = self.ping_error.read().clone();
        if let Some(handler) = handler {
            contained("ping error", || handler(error));
        }
    }

    pub(crate) fn dropped(&self, reason: Dropped) {
        tracing::debug!(?reason, "dropped inbound frame");
        let handler = self.dropped.read().clone();
        if let Some(handler) = handler {
            contained("drop", || handler(&reason));
        }
    }
}

/// Run a user callback, logging instead of unwinding into the caller.
pub(crate) fn contained(kind: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(kind, "handler panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replace_silently() {
        let handlers = Handlers::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let c = first.clone();
        handlers.set_ping_error(Arc::new(move |_: &TransportError| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = second.clone();
        handlers.set_ping_error(Arc::new(move |_: &TransportError| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        handlers.ping_error(&TransportError::Closed);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_slots_are_noops() {
        let handlers = Handlers::default();
        handlers.message_error(&TransportError::Closed);
        handlers.ping_error(&TransportError::Closed);
        handlers.dropped(Dropped::Malformed);
    }

    #[test]
    fn panicking_handler_is_contained() {
        let handlers = Handlers::default();
        handlers.set_dropped(Arc::new(|_: &Dropped| panic!("drop handler")));
        handlers.set_message_error(Arc::new(|_: &TransportError| panic!("error handler")));

        handlers.dropped(Dropped::Malformed);
        handlers.message_error(&TransportError::Closed);
    }

    #[test]
    fn slots_are_independent() {
        let handlers = Handlers::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let c = hits.clone();
        handlers.set_message_error(Arc::new(move |_: &TransportError| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        handlers.ping_error(&TransportError::Closed);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        handlers.message_error(&TransportError::Closed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
