//! Composition root for distributed cache managers.

use std::sync::Arc;

use sessiongrid_core::{AttributeMarshaller, Result, SessionGridError};

use crate::cache::SessionCache;
use crate::config::ReplicationConfig;
use crate::local::LocalSessionManager;
use crate::lock::LockManagerRegistry;
use crate::manager::DistributedCacheManager;
use crate::routing::{LocalityOracle, RoutingRegistry};
use crate::storage::storage_for;

/// Builds [`DistributedCacheManager`] instances from container-level
/// configuration.
///
/// One factory exists per server; it carries the process-wide lock manager
/// registry, the routing registry and the attribute marshaller, and wires a
/// manager per distributable deployment. The one hard precondition it
/// enforces is that the deployment's cache supports invocation batching —
/// without a batch boundary the record update cannot be atomic.
pub struct DistributedCacheManagerFactory {
    lock_registry: Arc<LockManagerRegistry>,
    routing: Arc<dyn RoutingRegistry>,
    marshaller: Arc<dyn AttributeMarshaller>,
}

impl DistributedCacheManagerFactory {
    /// Creates a factory over the process-wide collaborators.
    pub fn new(
        lock_registry: Arc<LockManagerRegistry>,
        routing: Arc<dyn RoutingRegistry>,
        marshaller: Arc<dyn AttributeMarshaller>,
    ) -> Self {
        Self {
            lock_registry,
            routing,
            marshaller,
        }
    }

    /// Builds the cache manager for one distributable deployment.
    ///
    /// Clustered (distributed-mode) caches are registered against the
    /// container's shared lock manager, enabling session-ownership
    /// enforcement; the registration is undone when the manager stops.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the cache does not support
    /// invocation batching, and surfaces lock-service startup failures.
    pub async fn create_manager(
        &self,
        config: &ReplicationConfig,
        cache: Arc<dyn SessionCache>,
        session_manager: Arc<dyn LocalSessionManager>,
        locality: Option<Arc<dyn LocalityOracle>>,
    ) -> Result<Arc<DistributedCacheManager>> {
        let capabilities = cache.capabilities();

        if !capabilities.batching {
            return Err(SessionGridError::Configuration(format!(
                "cache '{}' does not support invocation batching, which session replication requires",
                cache.name()
            )));
        }

        let storage = storage_for(
            config.granularity().storage_granularity(),
            Arc::clone(&self.marshaller),
        );

        let (lock_manager, lock_registry) = if capabilities.distributed {
            let lock_manager = self
                .lock_registry
                .add_cache(cache.container_name(), cache.name())
                .await?;
            (Some(lock_manager), Some(Arc::clone(&self.lock_registry)))
        } else {
            (None, None)
        };

        tracing::debug!(
            cache = %cache.name(),
            container = %cache.container_name(),
            granularity = %config.granularity(),
            distributed = capabilities.distributed,
            "composing distributed session cache manager"
        );

        let manager = DistributedCacheManager::new(
            session_manager,
            cache,
            storage,
            lock_manager,
            lock_registry,
            Arc::clone(&self.routing),
            locality,
            config.lock_timeout(),
        );

        if config.force_synchronous() {
            manager.set_force_synchronous(true);
        }

        Ok(Arc::new(manager))
    }
}

impl std::fmt::Debug for DistributedCacheManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCacheManagerFactory").finish()
    }
}
