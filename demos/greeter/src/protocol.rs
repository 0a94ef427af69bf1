//! Greeter message types.

use serde::{Deserialize, Serialize};
use tether_core::Message;

/// Client -> server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Greeting {
    pub text: String,
}

impl Message for Greeting {
    const DISCRIMINATOR: &'static str = "greeting";
}

/// Server -> client, one per greeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    /// How many greetings this connection has sent so far.
    pub seq: u64,
}

impl Message for Reply {
    const DISCRIMINATOR: &'static str = "reply";
}

/// Server -> client, sent when the server cannot make sense of a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejected {
    pub reason: String,
}

impl Message for Rejected {
    const DISCRIMINATOR: &'static str = "rejected";
}
