//! Client-side implementation for tether.
//!
//! A [`Socket`] keeps one duplex connection open to a server, routes inbound
//! envelopes to typed handlers by discriminator, and probes the connection
//! on a fixed interval. The byte transport is pluggable through
//! [`Transport`]; [`WebSocketTransport`] is the production implementation.

mod config;
mod error;
mod handlers;
mod keepalive;
mod receiver;
mod registry;
mod socket;
pub mod transport;
mod writer;

pub use config::{ConfigError, DEFAULT_KEEPALIVE_INTERVAL, Dispatch, SocketConfig};
pub use error::{ConnectError, SendError};
pub use handlers::Dropped;
pub use socket::{Completion, Socket};
pub use transport::{Connection, MemoryTransport, Transport, TransportError, WebSocketTransport};

pub use tether_core::{
    BasicQuery, ClientId, Codec, CodecError, ConnectionTarget, Envelope, JsonCodec, Message, Query,
};
