//! Process-wide registry of per-container lock managers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use sessiongrid_core::Result;

use super::{ClusterLockManager, DistributedLock};

/// Creates the backing distributed lock service for a cache container.
pub trait LockProvider: Send + Sync {
    /// Builds the (not yet started) lock service for `container_name`.
    fn create(&self, container_name: &str) -> Arc<dyn DistributedLock>;
}

/// One registry entry: the container's lock manager plus the names of the
/// caches currently relying on it. The cache set has its own monitor; it is
/// only ever taken while the registry's global lock is already held.
struct LockManagerEntry {
    manager: Arc<ClusterLockManager>,
    caches: Mutex<HashSet<String>>,
}

impl LockManagerEntry {
    fn new(manager: Arc<ClusterLockManager>) -> Self {
        Self {
            manager,
            caches: Mutex::new(HashSet::new()),
        }
    }

    fn add_cache(&self, cache_name: &str) {
        self.caches
            .lock()
            .expect("lock manager entry poisoned")
            .insert(cache_name.to_string());
    }

    /// Removes a cache registration; returns `true` when no cache remains.
    fn remove_cache(&self, cache_name: &str) -> bool {
        let mut caches = self.caches.lock().expect("lock manager entry poisoned");
        caches.remove(cache_name);
        caches.is_empty()
    }
}

/// Process-wide registry of cluster lock managers, keyed by container name.
///
/// One lock manager exists per cache container, shared by every session
/// cache in that container. The manager (and its backing group
/// communication) is created and started lazily on the first
/// [`add_cache`](LockManagerRegistry::add_cache) for a container, and
/// stopped exactly when the last registered cache deregisters. Registration
/// and deregistration both run under a single global lock so container
/// start/stop can never race cache registration from deployments starting
/// in parallel.
///
/// The registry is created at server start and injected into whatever
/// composes cache managers; [`shutdown`](LockManagerRegistry::shutdown)
/// tears down anything still registered at process exit.
pub struct LockManagerRegistry {
    provider: Arc<dyn LockProvider>,
    entries: AsyncMutex<HashMap<String, Arc<LockManagerEntry>>>,
}

impl LockManagerRegistry {
    /// Creates a registry that builds lock services through `provider`.
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self {
            provider,
            entries: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Registers `cache_name` against `container_name`'s lock manager,
    /// creating and starting the manager if this is the container's first
    /// registration. Returns the shared manager.
    pub async fn add_cache(
        &self,
        container_name: &str,
        cache_name: &str,
    ) -> Result<Arc<ClusterLockManager>> {
        let mut entries = self.entries.lock().await;

        let entry = match entries.get(container_name) {
            Some(entry) => Arc::clone(entry),
            None => {
                let service = self.provider.create(container_name);
                let manager = Arc::new(ClusterLockManager::new(container_name, service));
                manager.start().await?;
                tracing::info!(container = %container_name, "started shared cluster lock manager");

                let entry = Arc::new(LockManagerEntry::new(Arc::clone(&manager)));
                entries.insert(container_name.to_string(), Arc::clone(&entry));
                entry
            }
        };

        entry.add_cache(cache_name);
        Ok(Arc::clone(&entry.manager))
    }

    /// Deregisters `cache_name` from `container_name`'s lock manager,
    /// stopping and discarding the manager when no cache remains registered.
    pub async fn remove_cache(&self, container_name: &str, cache_name: &str) {
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(container_name) else {
            return;
        };

        if entry.remove_cache(cache_name) {
            let entry = entries
                .remove(container_name)
                .expect("entry vanished under the registry lock");
            entry.manager.stop().await;
            tracing::info!(container = %container_name, "stopped shared cluster lock manager");
        }
    }

    /// Stops every lock manager still registered. Called at process
    /// shutdown.
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        for (container_name, entry) in entries.drain() {
            entry.manager.stop().await;
            tracing::info!(container = %container_name, "stopped shared cluster lock manager");
        }
    }
}

impl std::fmt::Debug for LockManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManagerRegistry").finish()
    }
}
