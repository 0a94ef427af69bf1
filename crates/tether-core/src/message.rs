//! Typed messages.
//!
//! Applications define their own message types; each one names the
//! discriminator it travels under.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A value that can travel inside an [`Envelope`](crate::Envelope).
///
/// The discriminator is the wire identity of the type. It must be unique
/// among the message types a process listens for and should never change
/// once peers depend on it.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tether_core::Message;
///
/// #[derive(Serialize, Deserialize)]
/// struct Greeting {
///     text: String,
/// }
///
/// impl Message for Greeting {
///     const DISCRIMINATOR: &'static str = "greeting";
/// }
/// ```
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    /// Wire identity of this message type.
    const DISCRIMINATOR: &'static str;
}
