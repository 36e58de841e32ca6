//! Attribute marshalling between in-memory values and replicated bytes.

use bytes::Bytes;

use crate::error::{Result, SessionGridError};
use crate::session::{AttributeValue, SessionAttributes};

/// Converts session attribute values to and from their replicated byte form.
///
/// One marshaller instance is shared by a deployment's storage strategy; it
/// must be stateless and cheap to call from concurrent request threads. The
/// per-attribute methods serve the fine-grained strategy, the whole-map
/// methods the coarse one.
pub trait AttributeMarshaller: Send + Sync {
    /// Serializes a single attribute value.
    fn marshal(&self, value: &AttributeValue) -> Result<Bytes>;

    /// Deserializes a single attribute value.
    fn unmarshal(&self, bytes: &[u8]) -> Result<AttributeValue>;

    /// Serializes an entire attribute map as one payload.
    fn marshal_map(&self, attributes: &SessionAttributes) -> Result<Bytes>;

    /// Deserializes an entire attribute map from one payload.
    fn unmarshal_map(&self, bytes: &[u8]) -> Result<SessionAttributes>;
}

/// JSON-based [`AttributeMarshaller`].
///
/// The default marshaller for deployments whose session attributes are
/// JSON-representable values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl JsonMarshaller {
    /// Creates a new JSON marshaller.
    pub fn new() -> Self {
        Self
    }
}

impl AttributeMarshaller for JsonMarshaller {
    fn marshal(&self, value: &AttributeValue) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| SessionGridError::Serialization(e.to_string()))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<AttributeValue> {
        serde_json::from_slice(bytes).map_err(|e| SessionGridError::Serialization(e.to_string()))
    }

    fn marshal_map(&self, attributes: &SessionAttributes) -> Result<Bytes> {
        serde_json::to_vec(attributes)
            .map(Bytes::from)
            .map_err(|e| SessionGridError::Serialization(e.to_string()))
    }

    fn unmarshal_map(&self, bytes: &[u8]) -> Result<SessionAttributes> {
        serde_json::from_slice(bytes).map_err(|e| SessionGridError::Serialization(e.to_string()))
    }
}
