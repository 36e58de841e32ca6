//! Whole-session attribute storage.

use std::sync::Arc;

use sessiongrid_core::{
    AttributeChanges, AttributeMarshaller, OutgoingSessionData, Result, SessionAttributes,
    SessionGridError,
};

use crate::record::SessionRecord;

use super::{SessionAttributeStorage, StorageGranularity};

/// Serializes the entire attribute map as a single blob.
///
/// Any single attribute change re-serializes the whole map, but a session
/// occupies exactly one attribute slot and loads in one deserialization.
pub struct CoarseSessionAttributeStorage {
    marshaller: Arc<dyn AttributeMarshaller>,
}

impl CoarseSessionAttributeStorage {
    /// Creates a coarse strategy over the given marshaller.
    pub fn new(marshaller: Arc<dyn AttributeMarshaller>) -> Self {
        Self { marshaller }
    }
}

impl SessionAttributeStorage for CoarseSessionAttributeStorage {
    fn store(&self, record: &mut SessionRecord, outgoing: &OutgoingSessionData) -> Result<()> {
        match &outgoing.changes {
            AttributeChanges::Whole(Some(attributes)) => {
                let blob = self.marshaller.marshal_map(attributes)?;
                record.set_attributes_blob(blob);
                Ok(())
            }
            // Unchanged attributes: the existing blob stands.
            AttributeChanges::Whole(None) => Ok(()),
            AttributeChanges::Delta { .. } => Err(SessionGridError::Configuration(
                "whole-session storage received a per-attribute payload".to_string(),
            )),
        }
    }

    fn load(&self, record: &SessionRecord) -> Result<SessionAttributes> {
        match record.attributes_blob()? {
            Some(blob) => self.marshaller.unmarshal_map(blob),
            None => Ok(SessionAttributes::new()),
        }
    }

    fn granularity(&self) -> StorageGranularity {
        StorageGranularity::Coarse
    }
}

impl std::fmt::Debug for CoarseSessionAttributeStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoarseSessionAttributeStorage").finish()
    }
}
