//! Pluggable value serialization.
//!
//! The protocol never looks inside serialized values; it only needs to turn
//! structured values into text and back. [`JsonCodec`] is the default.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Boxed source error carried by [`CodecError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Converts structured values to and from their text form.
pub trait Codec: Send + Sync + 'static {
    /// Serialize `value` to text.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError>;

    /// Deserialize text into a `T`.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError>;
}

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

/// A value could not be serialized or deserialized.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] BoxError),
    #[error("failed to decode value: {0}")]
    Decode(#[source] BoxError),
}
