//! The local session manager seam.
//!
//! The in-process session manager is the consumer of this core. It calls in
//! to persist and load session state, and the core calls back through
//! [`LocalSessionManager`] when the replicated cache reports changes made by
//! other nodes, so the local in-memory view stays consistent without the
//! session manager needing any cluster awareness.

use sessiongrid_core::{DataOwner, Result, SessionId, SessionMetadata};

/// Callbacks into the node-local session manager.
///
/// Implementations are invoked from the cache's notification dispatch
/// context concurrently with request threads; they must be thread-safe.
/// Errors returned here are logged and swallowed at the listener boundary —
/// they never propagate into the cache engine.
pub trait LocalSessionManager: Send + Sync {
    /// A session was invalidated on another node; drop any local in-memory
    /// representation of it.
    fn notify_remote_invalidation(&self, session_id: &SessionId) -> Result<()>;

    /// A session's record changed in the distributed cache. Returns `true`
    /// if the incoming version superseded the local one, `false` on a
    /// version mismatch (incoming not newer) — a diagnostic signal, not an
    /// error.
    fn session_changed_in_distributed_cache(
        &self,
        session_id: &SessionId,
        owner: &DataOwner,
        version: u64,
        timestamp: u64,
        metadata: &SessionMetadata,
    ) -> Result<bool>;

    /// A session entry just became active on this node after being loaded
    /// back from a passivation store. Purely a lifecycle signal; no data
    /// accompanies it.
    fn session_activated(&self) -> Result<()>;

    /// Returns the route identifier clients use to reach this node, if the
    /// deployment assigns one.
    fn route_identifier(&self) -> Option<String>;
}
