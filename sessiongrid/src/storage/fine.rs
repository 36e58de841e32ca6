//! Per-attribute session storage.

use std::sync::Arc;

use sessiongrid_core::{
    AttributeChanges, AttributeMarshaller, OutgoingSessionData, Result, SessionAttributes,
    SessionGridError,
};

use crate::record::{SessionRecord, SlotValue};

use super::{SessionAttributeStorage, StorageGranularity};

/// Serializes each attribute into its own record slot.
///
/// Store cost is proportional to what actually changed during the request;
/// load pays one deserialization per distinct attribute. The fixed record
/// slots use non-string keys, so attribute iteration never sees them.
pub struct FineSessionAttributeStorage {
    marshaller: Arc<dyn AttributeMarshaller>,
}

impl FineSessionAttributeStorage {
    /// Creates a fine-grained strategy over the given marshaller.
    pub fn new(marshaller: Arc<dyn AttributeMarshaller>) -> Self {
        Self { marshaller }
    }
}

impl SessionAttributeStorage for FineSessionAttributeStorage {
    fn store(&self, record: &mut SessionRecord, outgoing: &OutgoingSessionData) -> Result<()> {
        match &outgoing.changes {
            AttributeChanges::Delta { modified, removed } => {
                for (name, value) in modified {
                    let blob = self.marshaller.marshal(value)?;
                    record.set_attribute(name.clone(), blob);
                }
                for name in removed {
                    record.remove_attribute(name);
                }
                Ok(())
            }
            AttributeChanges::Whole(_) => Err(SessionGridError::Configuration(
                "per-attribute storage received a whole-session payload".to_string(),
            )),
        }
    }

    fn load(&self, record: &SessionRecord) -> Result<SessionAttributes> {
        let mut attributes = SessionAttributes::new();
        for (name, value) in record.attribute_slots() {
            match value {
                SlotValue::Blob(blob) => {
                    attributes.insert(name.to_string(), self.marshaller.unmarshal(blob)?);
                }
                other => {
                    return Err(SessionGridError::Configuration(format!(
                        "attribute slot '{name}' holds a non-blob value: {other:?}"
                    )));
                }
            }
        }
        Ok(attributes)
    }

    fn granularity(&self) -> StorageGranularity {
        StorageGranularity::Fine
    }
}

impl std::fmt::Debug for FineSessionAttributeStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FineSessionAttributeStorage").finish()
    }
}
