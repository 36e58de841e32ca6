//! The replicated session record and its typed slot layout.
//!
//! A session's distributable state travels as one record per session id. The
//! record is a small slot map: three fixed slots carry version, timestamp and
//! metadata; attribute state lives either in the whole-session blob slot or
//! in one named slot per attribute, depending on the deployment's
//! replication granularity. Fixed slots use non-string keys so attribute
//! iteration can never collide with them.

use std::collections::HashMap;

use bytes::Bytes;

use sessiongrid_core::{Result, SessionGridError, SessionMetadata};

/// Ordinal of a fixed record slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FixedSlot {
    /// Monotonically increasing record version.
    Version = 0,
    /// Last-modified time, epoch milliseconds.
    Timestamp = 1,
    /// Distributable session metadata.
    Metadata = 2,
    /// Whole-session attribute blob (coarse granularity only).
    Attributes = 3,
}

/// Key of one record slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    /// One of the fixed, non-string slots.
    Fixed(FixedSlot),
    /// A per-attribute slot, keyed by attribute name (fine granularity only).
    Attribute(String),
}

/// Value held in one record slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// Record version.
    Version(u64),
    /// Last-modified time, epoch milliseconds.
    Timestamp(u64),
    /// Session metadata.
    Metadata(SessionMetadata),
    /// Marshalled attribute payload.
    Blob(Bytes),
}

/// The unit of replication: one record per session id.
///
/// Typed accessors enforce the slot/value pairing; a wrong-typed fixed slot
/// surfaces as a configuration error, which readers treat as a corrupt
/// record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    slots: HashMap<SlotKey, SlotValue>,
}

impl SessionRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the record carries no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the record version, if present.
    pub fn version(&self) -> Result<Option<u64>> {
        match self.slots.get(&SlotKey::Fixed(FixedSlot::Version)) {
            None => Ok(None),
            Some(SlotValue::Version(version)) => Ok(Some(*version)),
            Some(other) => Err(wrong_type(FixedSlot::Version, other)),
        }
    }

    /// Writes the record version.
    pub fn set_version(&mut self, version: u64) {
        self.slots
            .insert(SlotKey::Fixed(FixedSlot::Version), SlotValue::Version(version));
    }

    /// Returns the last-modified timestamp, if present.
    pub fn timestamp(&self) -> Result<Option<u64>> {
        match self.slots.get(&SlotKey::Fixed(FixedSlot::Timestamp)) {
            None => Ok(None),
            Some(SlotValue::Timestamp(timestamp)) => Ok(Some(*timestamp)),
            Some(other) => Err(wrong_type(FixedSlot::Timestamp, other)),
        }
    }

    /// Writes the last-modified timestamp.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.slots.insert(
            SlotKey::Fixed(FixedSlot::Timestamp),
            SlotValue::Timestamp(timestamp),
        );
    }

    /// Returns the session metadata, if present.
    pub fn metadata(&self) -> Result<Option<&SessionMetadata>> {
        match self.slots.get(&SlotKey::Fixed(FixedSlot::Metadata)) {
            None => Ok(None),
            Some(SlotValue::Metadata(metadata)) => Ok(Some(metadata)),
            Some(other) => Err(wrong_type(FixedSlot::Metadata, other)),
        }
    }

    /// Writes the session metadata.
    pub fn set_metadata(&mut self, metadata: SessionMetadata) {
        self.slots.insert(
            SlotKey::Fixed(FixedSlot::Metadata),
            SlotValue::Metadata(metadata),
        );
    }

    /// Returns the whole-session attribute blob, if present.
    pub fn attributes_blob(&self) -> Result<Option<&Bytes>> {
        match self.slots.get(&SlotKey::Fixed(FixedSlot::Attributes)) {
            None => Ok(None),
            Some(SlotValue::Blob(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(wrong_type(FixedSlot::Attributes, other)),
        }
    }

    /// Writes the whole-session attribute blob.
    pub fn set_attributes_blob(&mut self, bytes: Bytes) {
        self.slots
            .insert(SlotKey::Fixed(FixedSlot::Attributes), SlotValue::Blob(bytes));
    }

    /// Returns the marshalled payload of one named attribute, if present.
    pub fn attribute(&self, name: &str) -> Result<Option<&Bytes>> {
        match self.slots.get(&SlotKey::Attribute(name.to_string())) {
            None => Ok(None),
            Some(SlotValue::Blob(bytes)) => Ok(Some(bytes)),
            Some(_) => Err(SessionGridError::Configuration(format!(
                "attribute slot '{name}' holds a non-blob value"
            ))),
        }
    }

    /// Writes the marshalled payload of one named attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, bytes: Bytes) {
        self.slots
            .insert(SlotKey::Attribute(name.into()), SlotValue::Blob(bytes));
    }

    /// Removes one named attribute slot; returns `true` if it existed.
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        self.slots
            .remove(&SlotKey::Attribute(name.to_string()))
            .is_some()
    }

    /// Iterates the per-attribute slots, skipping the fixed slots.
    pub fn attribute_slots(&self) -> impl Iterator<Item = (&str, &SlotValue)> {
        self.slots.iter().filter_map(|(key, value)| match key {
            SlotKey::Attribute(name) => Some((name.as_str(), value)),
            SlotKey::Fixed(_) => None,
        })
    }
}

fn wrong_type(slot: FixedSlot, found: &SlotValue) -> SessionGridError {
    SessionGridError::Configuration(format!(
        "record slot {slot:?} holds a value of the wrong type: {found:?}"
    ))
}
