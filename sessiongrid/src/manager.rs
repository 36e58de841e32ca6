//! The distributed cache manager: the session layer's view of the cluster.
//!
//! One manager exists per distributable web deployment. Request threads call
//! in to persist, load and remove session state; the manager delegates
//! attribute serialization to the deployment's storage strategy, wraps
//! writes in the cache's invocation batch, and applies the force-synchronous
//! replication policy. Independently, the cache's notification stream feeds
//! remote changes back into the local session manager so its in-memory view
//! stays consistent without any cluster awareness of its own.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;

use sessiongrid_core::{
    DataOwner, IncomingSessionData, OutgoingSessionData, Result, SessionGridError, SessionId,
};

use crate::cache::{
    CacheEvent, CacheEventHandler, CacheEventKind, Flag, InvocationFlags, SessionCache,
    SubscriptionId,
};
use crate::invoker::ForceSynchronousCacheInvoker;
use crate::local::LocalSessionManager;
use crate::lock::{ClusterLockManager, LockManagerRegistry, LockResult};
use crate::record::SessionRecord;
use crate::routing::{Locality, LocalityOracle, RoutingRegistry};
use crate::storage::SessionAttributeStorage;

/// Masks a session id for log output.
fn mask(session_id: &str) -> String {
    let chars: Vec<char> = session_id.chars().collect();
    if chars.len() <= 8 {
        return session_id.to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}****{tail}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopped,
}

/// Session-ownership operations, available when the deployment carries a
/// cluster lock manager.
///
/// Obtained from
/// [`DistributedCacheManager::session_ownership_support`]; a `None` there
/// means no ownership enforcement exists and callers proceed optimistically.
pub struct SessionOwnershipSupport<'a> {
    lock_manager: &'a ClusterLockManager,
    cache_name: &'a str,
    lock_timeout: Duration,
}

impl SessionOwnershipSupport<'_> {
    fn lock_key(&self, session_id: &SessionId) -> String {
        format!("{}/{}", self.cache_name, session_id)
    }

    /// Acquires cluster-wide ownership of a session.
    ///
    /// `new_lock` marks a session this node is creating for the first time,
    /// which claims the lock without consulting the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`SessionGridError::LockTimeout`] when ownership could not be
    /// granted within the configured timeout.
    pub async fn acquire_session_ownership(
        &self,
        session_id: &SessionId,
        new_lock: bool,
    ) -> Result<LockResult> {
        let result = self
            .lock_manager
            .lock(&self.lock_key(session_id), self.lock_timeout, new_lock)
            .await?;

        tracing::trace!(
            session = %mask(session_id.as_str()),
            new_lock,
            result = %result,
            "acquired session ownership"
        );

        Ok(result)
    }

    /// Releases cluster-wide ownership of a session. `remove` signals the
    /// session is permanently gone, discarding the lock's cluster-wide
    /// bookkeeping as well.
    pub async fn relinquish_session_ownership(&self, session_id: &SessionId, remove: bool) {
        tracing::trace!(
            session = %mask(session_id.as_str()),
            remove,
            "relinquishing session ownership"
        );

        self.lock_manager
            .unlock(&self.lock_key(session_id), remove)
            .await;
    }
}

/// Receives the cache's change notifications and relays remote events into
/// the local session manager. Callback failures are logged here and never
/// reach the cache's dispatch context.
struct ChangeListener {
    session_manager: Arc<dyn LocalSessionManager>,
}

impl ChangeListener {
    fn removed(&self, event: &CacheEvent) {
        if let Err(e) = self.session_manager.notify_remote_invalidation(&event.key) {
            tracing::warn!(
                session = %mask(event.key.as_str()),
                error = %e,
                "remote-invalidation callback failed"
            );
        }
    }

    fn modified(&self, event: &CacheEvent) {
        let Some(record) = &event.value else {
            return;
        };
        if record.is_empty() {
            return;
        }

        let (version, timestamp, metadata) =
            match (record.version(), record.timestamp(), record.metadata()) {
                (Ok(Some(version)), Ok(Some(timestamp)), Ok(Some(metadata))) => {
                    (version, timestamp, metadata.clone())
                }
                // An incomplete record carries nothing worth relaying.
                _ => return,
            };

        match self.session_manager.session_changed_in_distributed_cache(
            &event.key,
            &DataOwner::Local,
            version,
            timestamp,
            &metadata,
        ) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    session = %mask(event.key.as_str()),
                    version,
                    "possible concurrency problem: replicated version is not newer than the in-memory version"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session = %mask(event.key.as_str()),
                    error = %e,
                    "session-changed callback failed"
                );
            }
        }
    }

    fn activated(&self) {
        if let Err(e) = self.session_manager.session_activated() {
            tracing::warn!(error = %e, "session-activated callback failed");
        }
    }
}

impl CacheEventHandler for ChangeListener {
    fn on_event(&self, event: CacheEvent) {
        // React only to completed changes made by other nodes.
        if event.pre || event.origin_local {
            return;
        }

        match event.kind {
            CacheEventKind::Removed => self.removed(&event),
            CacheEventKind::Modified => self.modified(&event),
            CacheEventKind::Activated => self.activated(),
        }
    }
}

/// Orchestrates session replication over one replicated cache.
pub struct DistributedCacheManager {
    session_manager: Arc<dyn LocalSessionManager>,
    cache: Arc<dyn SessionCache>,
    storage: Arc<dyn SessionAttributeStorage>,
    lock_manager: Option<Arc<ClusterLockManager>>,
    lock_registry: Option<Arc<LockManagerRegistry>>,
    routing: Arc<dyn RoutingRegistry>,
    locality: Option<Arc<dyn LocalityOracle>>,
    invoker: ForceSynchronousCacheInvoker,
    listener: Arc<ChangeListener>,
    lock_timeout: Duration,
    passivation_enabled: bool,
    state: Mutex<Lifecycle>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl DistributedCacheManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_manager: Arc<dyn LocalSessionManager>,
        cache: Arc<dyn SessionCache>,
        storage: Arc<dyn SessionAttributeStorage>,
        lock_manager: Option<Arc<ClusterLockManager>>,
        lock_registry: Option<Arc<LockManagerRegistry>>,
        routing: Arc<dyn RoutingRegistry>,
        locality: Option<Arc<dyn LocalityOracle>>,
        lock_timeout: Duration,
    ) -> Self {
        let passivation_enabled = cache.capabilities().passivation;
        let listener = Arc::new(ChangeListener {
            session_manager: Arc::clone(&session_manager),
        });

        Self {
            session_manager,
            cache,
            storage,
            lock_manager,
            lock_registry,
            routing,
            locality,
            invoker: ForceSynchronousCacheInvoker::new(),
            listener,
            lock_timeout,
            passivation_enabled,
            state: Mutex::new(Lifecycle::Created),
            subscription: Mutex::new(None),
        }
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> Result<()> {
        let mut state = self.state.lock().expect("lifecycle state poisoned");
        if *state != from {
            return Err(SessionGridError::Lifecycle(format!(
                "cache manager for '{}' is {:?}, expected {from:?}",
                self.cache.name(),
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    fn ensure_started(&self) -> Result<()> {
        let state = self.state.lock().expect("lifecycle state poisoned");
        if *state != Lifecycle::Started {
            return Err(SessionGridError::Lifecycle(format!(
                "cache manager for '{}' is {:?}, expected Started",
                self.cache.name(),
                *state
            )));
        }
        Ok(())
    }

    /// Starts the manager: subscribes for change notifications and, on
    /// distributed deployments, publishes this node's route.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if the manager was already started; a
    /// manager never restarts. Route publication failures are also
    /// surfaced.
    pub async fn start(&self) -> Result<()> {
        self.transition(Lifecycle::Created, Lifecycle::Started)?;

        let subscription = self
            .cache
            .subscribe(Arc::clone(&self.listener) as Arc<dyn CacheEventHandler>);
        *self.subscription.lock().expect("subscription poisoned") = Some(subscription);

        if self.locality.is_some() {
            if let Some(route) = self.session_manager.route_identifier() {
                self.routing
                    .publish(self.cache.local_address(), route)
                    .await?;
            }
        }

        tracing::info!(cache = %self.cache.name(), "started distributed session cache manager");
        Ok(())
    }

    /// Stops the manager: unsubscribes, deregisters from the shared lock
    /// manager, and stops the underlying cache.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the manager is currently started.
    pub async fn stop(&self) -> Result<()> {
        self.transition(Lifecycle::Started, Lifecycle::Stopped)?;

        if let Some(subscription) = self
            .subscription
            .lock()
            .expect("subscription poisoned")
            .take()
        {
            self.cache.unsubscribe(subscription);
        }

        if let Some(registry) = &self.lock_registry {
            registry
                .remove_cache(self.cache.container_name(), self.cache.name())
                .await;
        }

        self.cache.stop().await;

        tracing::info!(cache = %self.cache.name(), "stopped distributed session cache manager");
        Ok(())
    }

    /// Lifecycle hook: a session was created locally. No cache interaction.
    pub fn session_created(&self, session_id: &SessionId) {
        tracing::trace!(session = %mask(session_id.as_str()), "session created");
    }

    /// Persists an outgoing session's state into the replicated cache.
    ///
    /// The record is established on first store and fully restamped
    /// (version, timestamp, metadata) on every store; the attribute payload
    /// is applied by the deployment's storage strategy. The whole update is
    /// one batch: it commits entirely or not at all.
    ///
    /// # Errors
    ///
    /// Surfaces serialization and replication failures — the caller decided
    /// to write and must know if the write did not happen.
    pub async fn store_session_data(&self, data: &OutgoingSessionData) -> Result<()> {
        self.ensure_started()?;
        tracing::trace!(session = %mask(data.session_id.as_str()), version = data.version, "storing session data");

        let started = self.cache.start_batch().await?;
        let result = self.store_in_batch(data).await;
        if started {
            self.cache.end_batch(result.is_ok()).await;
        }
        result
    }

    async fn store_in_batch(&self, data: &OutgoingSessionData) -> Result<()> {
        let flags = self.invoker.decorate(InvocationFlags::none());

        let mut record = self
            .cache
            .put_if_absent(&data.session_id, SessionRecord::new(), flags)
            .await?;

        record.set_version(data.version);
        record.set_timestamp(data.timestamp);
        record.set_metadata(data.metadata.clone());
        if let Err(e) = self.storage.store(&mut record, data) {
            tracing::warn!(
                session = %mask(data.session_id.as_str()),
                error = %e,
                "failed to store session attributes"
            );
            return Err(e);
        }

        self.cache.put(&data.session_id, record, flags).await
    }

    /// Loads a session's replicated state, attributes included.
    ///
    /// Returns `None` when the session is absent — and also when the record
    /// is corrupt or unreachable: read failures never propagate to the
    /// session layer; they degrade to "session not found" after dropping
    /// the local copy.
    pub async fn get_session_data(
        &self,
        session_id: &SessionId,
        initial_load: bool,
    ) -> Option<IncomingSessionData> {
        tracing::trace!(session = %mask(session_id.as_str()), initial_load, "loading session data");

        self.get_data(session_id, true).await
    }

    /// Loads a session's replicated state in an owner-scoped context.
    ///
    /// A non-[`Local`](DataOwner::Local) owner means another node holds the
    /// canonical copy and this call is purely local bookkeeping: no cluster
    /// read is attempted and `None` is returned regardless of presence.
    pub async fn get_session_data_for(
        &self,
        session_id: &SessionId,
        owner: &DataOwner,
        include_attributes: bool,
    ) -> Option<IncomingSessionData> {
        tracing::trace!(
            session = %mask(session_id.as_str()),
            ?owner,
            include_attributes,
            "loading session data for owner"
        );

        if !owner.is_local() {
            return None;
        }
        self.get_data(session_id, include_attributes).await
    }

    async fn get_data(
        &self,
        session_id: &SessionId,
        include_attributes: bool,
    ) -> Option<IncomingSessionData> {
        match self.read_record(session_id, include_attributes).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    session = %mask(session_id.as_str()),
                    error = %e,
                    "problem accessing session; treating it as not found"
                );

                // Drop the local copy only; the distributed copy is not ours
                // to judge.
                if let Err(cleanup) = self.remove(session_id, true).await {
                    tracing::debug!(
                        session = %mask(session_id.as_str()),
                        error = %cleanup,
                        "local cleanup after failed read also failed"
                    );
                }

                None
            }
        }
    }

    async fn read_record(
        &self,
        session_id: &SessionId,
        include_attributes: bool,
    ) -> Result<Option<IncomingSessionData>> {
        let flags = self.invoker.decorate(InvocationFlags::none());

        let Some(record) = self.cache.get(session_id, flags).await? else {
            return Ok(None);
        };

        let (Some(version), Some(timestamp), Some(metadata)) = (
            record.version()?,
            record.timestamp()?,
            record.metadata()?.cloned(),
        ) else {
            return Err(SessionGridError::Serialization(
                "session record is missing version, timestamp or metadata".to_string(),
            ));
        };

        let attributes = if include_attributes {
            Some(self.storage.load(&record)?)
        } else {
            None
        };

        Ok(Some(IncomingSessionData {
            version,
            timestamp,
            metadata,
            attributes,
        }))
    }

    /// Removes a session from the replicated cache, cluster-wide.
    ///
    /// The value is deleted without first being pulled across the network.
    /// Removing an absent session is not an error.
    pub async fn remove_session(&self, session_id: &SessionId) -> Result<()> {
        self.ensure_started()?;
        tracing::trace!(session = %mask(session_id.as_str()), "removing session");

        self.remove(session_id, false).await
    }

    /// Drops this node's copy of a session without triggering cluster-wide
    /// deletion.
    pub async fn remove_session_local(&self, session_id: &SessionId) -> Result<()> {
        tracing::trace!(session = %mask(session_id.as_str()), "removing session locally");

        self.remove(session_id, true).await
    }

    /// Owner-scoped local removal: a no-op unless the owner context is
    /// [`Local`](DataOwner::Local).
    pub async fn remove_session_local_for(
        &self,
        session_id: &SessionId,
        owner: &DataOwner,
    ) -> Result<()> {
        tracing::trace!(
            session = %mask(session_id.as_str()),
            ?owner,
            "removing session locally for owner"
        );

        if !owner.is_local() {
            return Ok(());
        }
        self.remove(session_id, true).await
    }

    async fn remove(&self, session_id: &SessionId, local: bool) -> Result<()> {
        let flags = InvocationFlags::none().with(Flag::SkipCacheLoad).with(if local {
            Flag::CacheModeLocal
        } else {
            Flag::SkipRemoteLookup
        });
        let flags = self.invoker.decorate(flags);

        let started = self.cache.start_batch().await?;
        let result = self.cache.remove(session_id, flags).await;
        if started {
            self.cache.end_batch(result.is_ok()).await;
        }
        result
    }

    /// Evicts a session's in-memory copy on this node.
    ///
    /// Eviction is not removal: the persisted and replicated copies are
    /// untouched, and a later read retrieves the record again.
    pub async fn evict_session(&self, session_id: &SessionId) -> Result<()> {
        tracing::trace!(session = %mask(session_id.as_str()), "evicting session");

        self.cache.evict(session_id).await
    }

    /// Owner-scoped eviction: a no-op unless the owner context is
    /// [`Local`](DataOwner::Local) — the owning node evicts its own copy.
    pub async fn evict_session_for(
        &self,
        session_id: &SessionId,
        owner: &DataOwner,
    ) -> Result<()> {
        tracing::trace!(
            session = %mask(session_id.as_str()),
            ?owner,
            "evicting session for owner"
        );

        if !owner.is_local() {
            return Ok(());
        }
        self.cache.evict(session_id).await
    }

    /// Returns the session ids currently present in the replicated map.
    pub async fn session_ids(&self) -> Result<Vec<SessionId>> {
        self.cache.keys().await
    }

    /// Returns whether a passivation store backs this deployment's cache.
    pub fn is_passivation_enabled(&self) -> bool {
        self.passivation_enabled
    }

    /// Sets or clears the deployment-wide force-synchronous replication
    /// policy.
    pub fn set_force_synchronous(&self, force: bool) {
        self.invoker.set_force_synchronous(force);
    }

    /// Returns the invocation policy, for the container's request-lifecycle
    /// hook (request-scoped force-synchronous handling).
    pub fn invoker(&self) -> &ForceSynchronousCacheInvoker {
        &self.invoker
    }

    /// Returns the session-ownership operations, or `None` when this
    /// deployment has no cluster lock manager — callers then proceed
    /// without ownership enforcement.
    pub fn session_ownership_support(&self) -> Option<SessionOwnershipSupport<'_>> {
        self.lock_manager
            .as_deref()
            .map(|lock_manager| SessionOwnershipSupport {
                lock_manager,
                cache_name: self.cache.name(),
                lock_timeout: self.lock_timeout,
            })
    }

    /// Returns whether this node holds a copy of the session's key.
    ///
    /// Fails open: without a locality oracle, or when the oracle is
    /// uncertain, the session counts as local — under-routing is worse than
    /// a redundant local copy.
    pub fn is_local(&self, session_id: &SessionId) -> bool {
        match &self.locality {
            None => true,
            Some(oracle) => !matches!(oracle.locality(session_id), Locality::Remote),
        }
    }

    /// Picks the route the next request for this session should use.
    ///
    /// When the session's key hashes to this node (or ownership is
    /// uncertain), this node's own route is returned. Otherwise a uniformly
    /// random owner is chosen and its published route returned — and the
    /// rest of the current request's invocations are forced synchronous, so
    /// the session write is durably visible on the target node before the
    /// response carrying the new route is sent.
    pub async fn locate(&self, session_id: &SessionId) -> Option<String> {
        if let Some(oracle) = &self.locality {
            // Mid-rehash the owner list is unreliable; don't hold up the
            // request, just keep it here.
            if !oracle.rehash_in_progress() {
                let owners = oracle.owners_of(session_id);
                let local = self.cache.local_address();

                if !owners.is_empty() && !owners.contains(&local) {
                    let target = owners[rand::thread_rng().gen_range(0..owners.len())];

                    match self.routing.route_of(&target).await {
                        Ok(Some(route)) => {
                            tracing::trace!(
                                session = %mask(session_id.as_str()),
                                target = %target,
                                route = %route,
                                "session hashes to a remote node; next request will route there"
                            );

                            self.invoker.force_request_synchronous();
                            return Some(route);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                session = %mask(session_id.as_str()),
                                error = %e,
                                "route lookup failed; keeping the session here"
                            );
                        }
                    }
                }
            }
        }

        self.session_manager.route_identifier()
    }
}

impl std::fmt::Debug for DistributedCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCacheManager")
            .field("cache", &self.cache.name())
            .field("state", &*self.state.lock().expect("lifecycle state poisoned"))
            .finish()
    }
}
