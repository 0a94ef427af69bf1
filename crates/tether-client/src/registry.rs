//! Discriminator → listener map.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::CodecError;

/// Decodes an inner payload and, if that works, runs the handler.
pub(crate) type Listener = Arc<dyn Fn(&str) -> Result<(), CodecError> + Send + Sync>;

/// One listener per discriminator; the latest registration wins.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `discriminator`, returning `true` if it
    /// replaced an earlier one.
    pub(crate) fn register(&self, discriminator: impl Into<String>, listener: Listener) -> bool {
        self.listeners
            .write()
            .insert(discriminator.into(), listener)
            .is_some()
    }

    /// The listener for `discriminator`, if any.
    ///
    /// The lock is released before returning, so the listener can be run
    /// while other registrations proceed.
    pub(crate) fn lookup(&self, discriminator: &str) -> Option<Listener> {
        self.listeners.read().get(discriminator).cloned()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}
