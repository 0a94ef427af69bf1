//! Socket errors.

use crate::transport::TransportError;
use tether_core::{CodecError, TargetError};

/// `connect` failed. Nothing was left open.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid connection target: {0}")]
    InvalidTarget(#[from] TargetError),
    #[error("query could not be serialized: {0}")]
    InvalidQuery(#[source] CodecError),
    #[error("failed to open connection: {0}")]
    Transport(#[from] TransportError),
}

/// A message could not be sent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("socket is not connected")]
    Disconnected,
    #[error("message could not be serialized: {0}")]
    Codec(#[from] CodecError),
    #[error("transport failed to send: {0}")]
    Transport(#[from] TransportError),
}
