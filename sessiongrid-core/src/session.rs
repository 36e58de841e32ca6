//! Session data model shared by the replication core and its collaborators.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The value type carried by session attributes.
pub type AttributeValue = serde_json::Value;

/// A plain attribute-name to value mapping for one session.
pub type SessionAttributes = HashMap<String, AttributeValue>;

/// Identifier of one distributable HTTP session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this session id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Distributable session metadata.
///
/// Carried alongside the attribute payload in every replicated record. The
/// replication core transports it without interpreting it; expiration policy
/// stays with the local session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// The session's externally visible id.
    pub id: String,
    /// Session creation time, epoch milliseconds.
    pub creation_time: u64,
    /// Maximum inactive interval in seconds; negative means never expire.
    pub max_inactive_interval: i64,
    /// Whether the session has yet to complete its first request.
    pub new: bool,
}

impl SessionMetadata {
    /// Creates metadata for a freshly created session.
    pub fn new(id: impl Into<String>, creation_time: u64, max_inactive_interval: i64) -> Self {
        Self {
            id: id.into(),
            creation_time,
            max_inactive_interval,
            new: true,
        }
    }
}

/// Identifies which node's view a lookup or cleanup targets.
///
/// Replaces the original nullable "data owner" string: `Local` is the
/// this-node context (the historical `null`), `Node` names a remote owner on
/// whose behalf only purely local bookkeeping may happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOwner {
    /// This node is the lookup context; distributed reads are permitted.
    Local,
    /// A remote node (identified by its route) owns the canonical copy.
    Node(String),
}

impl DataOwner {
    /// Returns `true` for the this-node context.
    pub fn is_local(&self) -> bool {
        matches!(self, DataOwner::Local)
    }
}

/// Attribute changes carried by an outgoing session, shaped by the
/// deployment's replication granularity.
#[derive(Debug, Clone)]
pub enum AttributeChanges {
    /// Whole-session granularity: the full attribute map, or `None` if no
    /// attribute changed during the request.
    Whole(Option<SessionAttributes>),
    /// Per-attribute granularity: the modified entries and the names removed
    /// during the request.
    Delta {
        /// Attributes written during the request.
        modified: SessionAttributes,
        /// Attribute names removed during the request.
        removed: HashSet<String>,
    },
}

impl AttributeChanges {
    /// Convenience constructor for an unchanged whole-session payload.
    pub fn unchanged() -> Self {
        AttributeChanges::Whole(None)
    }
}

/// Outbound session state handed to the replication core for storage.
#[derive(Debug, Clone)]
pub struct OutgoingSessionData {
    /// The session being replicated.
    pub session_id: SessionId,
    /// Monotonically increasing version stamped by the local session.
    pub version: u64,
    /// Last-modified time, epoch milliseconds.
    pub timestamp: u64,
    /// Session metadata to replicate alongside the attributes.
    pub metadata: SessionMetadata,
    /// The attribute payload for this request.
    pub changes: AttributeChanges,
}

/// Inbound session state reconstructed from the replicated record.
#[derive(Debug, Clone)]
pub struct IncomingSessionData {
    /// Version found in the record.
    pub version: u64,
    /// Last-modified time found in the record, epoch milliseconds.
    pub timestamp: u64,
    /// Metadata found in the record.
    pub metadata: SessionMetadata,
    /// The attribute map, present only when the read included attributes.
    pub attributes: Option<SessionAttributes>,
}
