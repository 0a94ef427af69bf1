//! Handshake queries.

use crate::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the target parameter that carries the serialized query.
pub const HANDSHAKE_PARAM: &str = "data";

/// Data sent to the server before the connection opens.
///
/// Applications define their own query types; the only requirement is that
/// each one carries the client's identifier.
pub trait Query: Serialize + Send + Sync {
    /// The stable identifier of the connecting client.
    fn client_id(&self) -> &ClientId;
}

/// A query with an identifier and free-form fields.
///
/// Serializes flat: `{"id": "u1", "name": "Ken"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicQuery {
    pub id: ClientId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BasicQuery {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Add a field, replacing any previous value under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl Query for BasicQuery {
    fn client_id(&self) -> &ClientId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Codec, JsonCodec};

    #[test]
    fn serializes_flat() {
        let query = BasicQuery::new("u1".parse().unwrap()).with("name", "Ken");
        let text = JsonCodec.encode(&query).unwrap();
        assert_eq!(text, r#"{"id":"u1","name":"Ken"}"#);
        let back: BasicQuery = JsonCodec.decode(&text).unwrap();
        assert_eq!(back, query);
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(JsonCodec.decode::<BasicQuery>(r#"{"name":"Ken"}"#).is_err());
    }
}
