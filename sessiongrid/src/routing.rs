//! Locality queries and route publication.
//!
//! Two collaborator seams live here. The [`LocalityOracle`] is the cache
//! engine's data-distribution awareness: which nodes hold a key, and whether
//! the answer can currently be trusted. The [`RoutingRegistry`] is the
//! cluster-wide map from node address to the route identifier a client-side
//! balancer understands; each node publishes its own entry at startup.

use async_trait::async_trait;

use sessiongrid_core::{Result, SessionId};

use crate::cache::NodeAddress;

/// Whether this node holds a copy of a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// This node is a primary or backup owner of the key.
    Local,
    /// Another node owns the key.
    Remote,
    /// Ownership cannot be determined right now (e.g. mid-rehash).
    Uncertain,
}

/// Data-distribution awareness for a distributed cache.
///
/// Only present for distribution-mode caches; replicated-everywhere and
/// local caches have no oracle, and callers treat every key as local.
pub trait LocalityOracle: Send + Sync {
    /// Classifies this node's relationship to `key`.
    fn locality(&self, key: &SessionId) -> Locality;

    /// Returns the addresses of the nodes owning `key`, primaries first.
    fn owners_of(&self, key: &SessionId) -> Vec<NodeAddress>;

    /// Returns `true` while key ownership is being rebalanced.
    fn rehash_in_progress(&self) -> bool;
}

/// Cluster-wide registry mapping node addresses to route identifiers.
#[async_trait]
pub trait RoutingRegistry: Send + Sync {
    /// Publishes this node's route, keeping any existing entry
    /// (put-if-absent semantics).
    async fn publish(&self, address: NodeAddress, route: String) -> Result<()>;

    /// Looks up the route identifier published for `address`.
    async fn route_of(&self, address: &NodeAddress) -> Result<Option<String>>;
}
