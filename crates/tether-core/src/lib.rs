//! Core types for tether.
//!
//! This crate provides the protocol primitives: the wire envelope, the
//! message and query traits, connection targets and the pluggable codec.
//! Applications define their own message types; this crate provides the
//! framing. The connection itself lives in `tether-client`.

mod client_id;
mod codec;
mod envelope;
mod message;
mod query;
mod target;

pub use client_id::{ClientId, ClientIdError};
pub use codec::{BoxError, Codec, CodecError, JsonCodec};
pub use envelope::{Envelope, EnvelopeError};
pub use message::Message;
pub use query::{BasicQuery, HANDSHAKE_PARAM, Query};
pub use target::{ConnectionTarget, TargetError};
