//! The replicated cache abstraction the session core rides on.
//!
//! The underlying cache engine is an external collaborator: a distributed
//! map with flag-scoped operations, an invocation-batching boundary, and a
//! change-notification stream. Everything the session core needs from it is
//! captured by [`SessionCache`]; the engine's transport, consistency
//! protocol and wire format stay on the other side of this trait.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use sessiongrid_core::{Result, SessionId};

use crate::record::SessionRecord;

/// Address of one cache node.
pub type NodeAddress = SocketAddr;

/// Per-invocation behavior flags, mirroring the scoping modes a replicated
/// cache exposes on its advanced operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Request synchronous replication for this invocation.
    ForceSynchronous,
    /// Skip loading the previous value from any backing store.
    SkipCacheLoad,
    /// Restrict the operation to this node's copy only.
    CacheModeLocal,
    /// Delete without first pulling the value across the network.
    SkipRemoteLookup,
}

/// A small set of [`Flag`]s attached to one cache invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationFlags {
    force_synchronous: bool,
    skip_cache_load: bool,
    cache_mode_local: bool,
    skip_remote_lookup: bool,
}

impl InvocationFlags {
    /// The empty flag set.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns this set with `flag` added.
    pub fn with(mut self, flag: Flag) -> Self {
        match flag {
            Flag::ForceSynchronous => self.force_synchronous = true,
            Flag::SkipCacheLoad => self.skip_cache_load = true,
            Flag::CacheModeLocal => self.cache_mode_local = true,
            Flag::SkipRemoteLookup => self.skip_remote_lookup = true,
        }
        self
    }

    /// Returns `true` if `flag` is in this set.
    pub fn contains(&self, flag: Flag) -> bool {
        match flag {
            Flag::ForceSynchronous => self.force_synchronous,
            Flag::SkipCacheLoad => self.skip_cache_load,
            Flag::CacheModeLocal => self.cache_mode_local,
            Flag::SkipRemoteLookup => self.skip_remote_lookup,
        }
    }
}

impl fmt::Display for InvocationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.force_synchronous {
            names.push("FORCE_SYNCHRONOUS");
        }
        if self.skip_cache_load {
            names.push("SKIP_CACHE_LOAD");
        }
        if self.cache_mode_local {
            names.push("CACHE_MODE_LOCAL");
        }
        if self.skip_remote_lookup {
            names.push("SKIP_REMOTE_LOOKUP");
        }
        write!(f, "[{}]", names.join(", "))
    }
}

/// The kind of a cache change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// An entry was removed from the replicated map.
    Removed,
    /// An entry was created or updated in the replicated map.
    Modified,
    /// An entry was loaded back from a passivation store.
    Activated,
}

/// A change notification emitted by the replicated cache.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Session id of the affected entry.
    pub key: SessionId,
    /// The entry's value after the change, when the engine provides it.
    pub value: Option<SessionRecord>,
    /// What happened to the entry.
    pub kind: CacheEventKind,
    /// `true` for the engine's pre-change callback, `false` post-change.
    pub pre: bool,
    /// `true` when the change originated on this node.
    pub origin_local: bool,
}

/// Receiver of cache change notifications.
///
/// Handlers run on the cache engine's dispatch thread; implementations must
/// contain their own failures — the subscription contract does not allow an
/// error or panic to escape into the engine's dispatch loop.
pub trait CacheEventHandler: Send + Sync {
    /// Called once per change notification.
    fn on_event(&self, event: CacheEvent);
}

/// Token identifying one change-notification subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a fresh subscription token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Static capabilities of a cache instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheCapabilities {
    /// Whether the cache supports invocation batching. Required.
    pub batching: bool,
    /// Whether entries are distributed across nodes (as opposed to a
    /// purely local or fully replicated-everywhere mode).
    pub distributed: bool,
    /// Whether a passivation store backs the in-memory copy.
    pub passivation: bool,
}

/// A replicated session-record map plus the batching and notification
/// facilities the session core depends on.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Returns the cache's name, unique within its container.
    fn name(&self) -> &str;

    /// Returns the name of the cache container this cache belongs to.
    fn container_name(&self) -> &str;

    /// Returns this node's address within the cache cluster.
    fn local_address(&self) -> NodeAddress;

    /// Returns the cache's static capabilities.
    fn capabilities(&self) -> CacheCapabilities;

    /// Reads the record for `key`, honoring `flags`.
    async fn get(&self, key: &SessionId, flags: InvocationFlags) -> Result<Option<SessionRecord>>;

    /// Writes the record for `key`, honoring `flags`.
    async fn put(
        &self,
        key: &SessionId,
        record: SessionRecord,
        flags: InvocationFlags,
    ) -> Result<()>;

    /// Establishes a record for `key` if none exists, returning the record
    /// now current for the key (the existing one, or `record` just
    /// inserted).
    async fn put_if_absent(
        &self,
        key: &SessionId,
        record: SessionRecord,
        flags: InvocationFlags,
    ) -> Result<SessionRecord>;

    /// Removes the record for `key`, honoring `flags`. Removing an absent
    /// key is not an error.
    async fn remove(&self, key: &SessionId, flags: InvocationFlags) -> Result<()>;

    /// Evicts the in-memory copy for `key` on this node only. Never touches
    /// the persisted or replicated copy.
    async fn evict(&self, key: &SessionId) -> Result<()>;

    /// Returns the session ids currently present in the replicated map.
    async fn keys(&self) -> Result<Vec<SessionId>>;

    /// Opens an invocation batch on the calling context. Returns `true` if a
    /// new batch was started, `false` if one was already open.
    async fn start_batch(&self) -> Result<bool>;

    /// Closes the current invocation batch, committing when `success` is
    /// `true` and rolling back otherwise.
    async fn end_batch(&self, success: bool);

    /// Subscribes a change-notification handler; the token deregisters it.
    fn subscribe(&self, handler: Arc<dyn CacheEventHandler>) -> SubscriptionId;

    /// Removes a previously registered handler. Unknown tokens are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Stops the underlying cache.
    async fn stop(&self);
}
