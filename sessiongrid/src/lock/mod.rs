//! Cluster-wide session ownership locking.
//!
//! Session affinity requires that at any instant at most one node believes
//! it is the authoritative owner of a session's in-memory representation.
//! The [`ClusterLockManager`] enforces that with a distributed lock keyed by
//! session, layered over a [`DistributedLock`] collaborator: local threads
//! share an already-held lock without a cluster round trip, first-time
//! claims skip the cluster entirely, and only genuine takeovers consult the
//! other nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use sessiongrid_core::{Result, SessionGridError};

mod registry;

pub use registry::{LockManagerRegistry, LockProvider};

/// Outcome of a session-ownership acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    /// The lock was acquired after requesting it from the cluster.
    AcquiredFromCluster,
    /// This node already held the lock.
    AlreadyHeld,
    /// The lock was claimed as brand new, without consulting the cluster.
    NewLock,
    /// Ownership enforcement is not available for this deployment.
    Unsupported,
}

impl fmt::Display for LockResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockResult::AcquiredFromCluster => write!(f, "ACQUIRED_FROM_CLUSTER"),
            LockResult::AlreadyHeld => write!(f, "ALREADY_HELD"),
            LockResult::NewLock => write!(f, "NEW_LOCK"),
            LockResult::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// Outcome reported by the backing distributed lock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    /// Acquired after coordination with the rest of the cluster.
    Acquired,
    /// The cluster already recorded this node as the holder.
    AlreadyHeld,
    /// The cluster had never seen this lock before.
    New,
}

/// The distributed mutual-exclusion primitive backing session ownership.
///
/// One service instance exists per cache container; its group-communication
/// machinery is started once, lazily, and stopped when the last cache in
/// the container deregisters (see [`LockManagerRegistry`]).
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Starts the service's backing group communication.
    async fn start(&self) -> Result<()>;

    /// Stops the service and releases its cluster resources.
    async fn stop(&self);

    /// Acquires the cluster-wide lock for `key`, waiting at most `timeout`.
    ///
    /// `new_claim` signals that the caller believes no node has ever held
    /// this lock, letting the service skip cluster coordination.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGridError::LockTimeout`] if the lock could not be
    /// acquired within `timeout`.
    async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
        new_claim: bool,
    ) -> Result<LockAcquisition>;

    /// Releases the cluster-wide lock for `key`. When `remove` is `true`,
    /// the service also discards its cluster-wide bookkeeping for the key
    /// (the session is gone for good, not merely idle).
    async fn release(&self, key: &str, remove: bool);
}

#[derive(Debug, Default)]
struct LockSlot {
    held: bool,
    users: usize,
}

/// Cluster-wide mutual exclusion keyed by session, with local sharing.
///
/// Multiple local threads share a held lock; only one node in the cluster
/// may hold it. One manager exists per cache container and is shared by
/// every session cache in that container.
pub struct ClusterLockManager {
    container_name: String,
    service: Arc<dyn DistributedLock>,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<LockSlot>>>>,
}

impl ClusterLockManager {
    /// Creates a lock manager for `container_name` over the given service.
    pub fn new(container_name: impl Into<String>, service: Arc<dyn DistributedLock>) -> Self {
        Self {
            container_name: container_name.into(),
            service,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the name of the container this manager serves.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Starts the backing lock service.
    pub async fn start(&self) -> Result<()> {
        tracing::debug!(container = %self.container_name, "starting cluster lock manager");
        self.service.start().await
    }

    /// Stops the backing lock service.
    pub async fn stop(&self) {
        tracing::debug!(container = %self.container_name, "stopping cluster lock manager");
        self.service.stop().await;
    }

    /// Acquires the lock for `key`, waiting at most `timeout`.
    ///
    /// `new_lock` marks a first-time claim ("I am creating this session"):
    /// the claim is recorded locally without consulting the cluster. A lock
    /// this node already holds is shared, returning
    /// [`LockResult::AlreadyHeld`] immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGridError::LockTimeout`] when neither the local
    /// holder yields nor the cluster grants the lock within `timeout`.
    pub async fn lock(
        &self,
        key: &str,
        timeout: Duration,
        new_lock: bool,
    ) -> Result<LockResult> {
        let slot = self.slot(key);

        // Bounds the wait on a concurrent local acquirer of the same key.
        let mut state = tokio::time::timeout(timeout, slot.lock())
            .await
            .map_err(|_| {
                SessionGridError::LockTimeout(format!(
                    "lock {key} not acquired within {timeout:?}"
                ))
            })?;

        if state.held {
            state.users += 1;
            return Ok(LockResult::AlreadyHeld);
        }

        let result = if new_lock {
            LockResult::NewLock
        } else {
            match self.service.acquire(key, timeout, false).await? {
                LockAcquisition::Acquired => LockResult::AcquiredFromCluster,
                LockAcquisition::AlreadyHeld => LockResult::AlreadyHeld,
                LockAcquisition::New => LockResult::NewLock,
            }
        };

        state.held = true;
        state.users = 1;
        Ok(result)
    }

    /// Releases one local use of the lock for `key`.
    ///
    /// The cluster-wide lock is yielded when the last local user releases.
    /// `remove` additionally discards the cluster's bookkeeping for the key.
    pub async fn unlock(&self, key: &str, remove: bool) {
        let Some(slot) = self.existing_slot(key) else {
            tracing::warn!(key = %key, "unlock of a lock this node never acquired");
            return;
        };

        let release = {
            let mut state = slot.lock().await;
            if !state.held {
                tracing::warn!(key = %key, "unlock of a lock this node does not hold");
                false
            } else {
                state.users -= 1;
                if state.users == 0 {
                    state.held = false;
                    true
                } else {
                    false
                }
            }
        };

        if release {
            self.service.release(key, remove).await;
            if remove {
                self.slots.lock().expect("lock slot table poisoned").remove(key);
            }
        }
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<LockSlot>> {
        let mut slots = self.slots.lock().expect("lock slot table poisoned");
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(LockSlot::default())))
            .clone()
    }

    fn existing_slot(&self, key: &str) -> Option<Arc<AsyncMutex<LockSlot>>> {
        self.slots
            .lock()
            .expect("lock slot table poisoned")
            .get(key)
            .cloned()
    }
}

impl fmt::Debug for ClusterLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLockManager")
            .field("container_name", &self.container_name)
            .finish()
    }
}
