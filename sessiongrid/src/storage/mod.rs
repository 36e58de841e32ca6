//! Session-attribute storage strategies.
//!
//! A strategy owns the mapping between a session's attribute state and the
//! replicated record, under one of two granularities: whole-session
//! ([`CoarseSessionAttributeStorage`]) or per-attribute
//! ([`FineSessionAttributeStorage`]). Strategies are stateless and shared;
//! one instance serves every session of a deployment.

use std::sync::Arc;

use sessiongrid_core::{AttributeMarshaller, OutgoingSessionData, Result, SessionAttributes};

use crate::record::SessionRecord;

mod coarse;
mod fine;

pub use coarse::CoarseSessionAttributeStorage;
pub use fine::FineSessionAttributeStorage;

/// The unit of attribute serialization, free of deprecated cases.
///
/// Deployment descriptors are parsed into
/// [`ReplicationGranularity`](crate::config::ReplicationGranularity), which
/// translates onto this variant type (mapping the deprecated legacy alias
/// onto `Coarse` with a logged warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageGranularity {
    /// The whole attribute map is serialized as one blob.
    Coarse,
    /// Each attribute is serialized independently.
    Fine,
}

/// Serializes session attributes into, and reconstructs them out of, the
/// replicated record.
pub trait SessionAttributeStorage: Send + Sync {
    /// Applies the outgoing session's attribute changes to `record`.
    fn store(&self, record: &mut SessionRecord, outgoing: &OutgoingSessionData) -> Result<()>;

    /// Reconstructs the full attribute map from `record`.
    fn load(&self, record: &SessionRecord) -> Result<SessionAttributes>;

    /// Returns the granularity this strategy implements.
    fn granularity(&self) -> StorageGranularity;
}

/// Builds the storage strategy for a granularity.
pub fn storage_for(
    granularity: StorageGranularity,
    marshaller: Arc<dyn AttributeMarshaller>,
) -> Arc<dyn SessionAttributeStorage> {
    match granularity {
        StorageGranularity::Coarse => Arc::new(CoarseSessionAttributeStorage::new(marshaller)),
        StorageGranularity::Fine => Arc::new(FineSessionAttributeStorage::new(marshaller)),
    }
}
