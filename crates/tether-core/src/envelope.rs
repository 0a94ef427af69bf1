//! The wire envelope.
//!
//! Every frame on the wire is one envelope: a discriminator naming the
//! message type and the inner message already serialized to text. The
//! inner payload is decoded only once a listener for the discriminator is
//! known, so the envelope itself stays type-agnostic.

use crate::{Codec, CodecError, Message};
use serde::{Deserialize, Serialize};

/// Tagged wrapper around a serialized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type identity, e.g. `"greeting"`.
    pub discriminator: String,
    /// The inner message in its serialized form.
    pub payload: String,
}

impl Envelope {
    /// Wrap an already serialized payload.
    pub fn wrap(discriminator: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            discriminator: discriminator.into(),
            payload: payload.into(),
        }
    }

    /// Serialize `message` and wrap it under its discriminator.
    pub fn seal<M: Message, C: Codec>(message: &M, codec: &C) -> Result<Self, CodecError> {
        let payload = codec.encode(message)?;
        Ok(Self::wrap(M::DISCRIMINATOR, payload))
    }

    /// Parse a frame into an envelope.
    ///
    /// Failure is an ordinary outcome: frames that are not UTF-8, do not
    /// decode, or carry an empty discriminator are rejected here and the
    /// caller decides what to do with them.
    pub fn unwrap<C: Codec>(bytes: &[u8], codec: &C) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| EnvelopeError::NotText)?;
        let envelope: Self = codec.decode(text).map_err(EnvelopeError::Malformed)?;
        if envelope.discriminator.is_empty() {
            return Err(EnvelopeError::EmptyDiscriminator);
        }
        Ok(envelope)
    }

    /// Serialize the envelope into a frame.
    pub fn to_bytes<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, CodecError> {
        codec.encode(self).map(String::into_bytes)
    }

    /// Whether this envelope carries an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.discriminator == M::DISCRIMINATOR
    }

    /// Decode the inner payload as an `M`, ignoring the discriminator.
    pub fn open<M: Message, C: Codec>(&self, codec: &C) -> Result<M, CodecError> {
        codec.decode(&self.payload)
    }
}

/// A frame could not be read as an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("frame is not valid UTF-8")]
    NotText,
    #[error("malformed envelope: {0}")]
    Malformed(#[source] CodecError),
    #[error("envelope discriminator is empty")]
    EmptyDiscriminator,
}
