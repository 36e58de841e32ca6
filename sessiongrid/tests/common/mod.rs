//! Common test utilities: in-memory collaborator doubles.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sessiongrid::core::{Result, SessionGridError};
use sessiongrid::{
    AttributeChanges, CacheCapabilities, CacheEvent, CacheEventHandler, CacheEventKind, DataOwner,
    DistributedCacheManager, DistributedCacheManagerFactory, DistributedLock, Flag,
    InvocationFlags, JsonMarshaller, Locality, LocalityOracle, LocalSessionManager,
    LockAcquisition, LockManagerRegistry, LockProvider, NodeAddress, OutgoingSessionData,
    ReplicationConfig, RoutingRegistry, SessionAttributes, SessionCache, SessionId,
    SessionMetadata, SessionRecord, SubscriptionId,
};

pub const LOCAL_ADDRESS: &str = "10.0.0.1:7600";
pub const PEER_ADDRESS: &str = "10.0.0.2:7600";

pub fn address(s: &str) -> NodeAddress {
    s.parse().expect("invalid test address")
}

/// One recorded cache invocation: operation name plus its effective flags.
#[derive(Debug, Clone)]
pub struct RecordedOp {
    pub op: &'static str,
    pub flags: InvocationFlags,
}

/// In-memory [`SessionCache`] double.
///
/// Models the two storage layers a passivating cache has: the in-memory
/// copy (`memory`) and the backing store (`store`). Eviction drops only the
/// in-memory copy; a later read reloads from the store and fires an
/// activation event. Local mutations dispatch post-change events with
/// `origin_local = true`; remote changes are injected with the
/// `fire_remote_*` helpers.
pub struct InMemorySessionCache {
    name: String,
    container: String,
    address: NodeAddress,
    capabilities: CacheCapabilities,
    memory: Mutex<HashMap<SessionId, SessionRecord>>,
    store: Mutex<HashMap<SessionId, SessionRecord>>,
    handlers: Mutex<HashMap<SubscriptionId, Arc<dyn CacheEventHandler>>>,
    ops: Mutex<Vec<RecordedOp>>,
    batch_depth: Mutex<usize>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    stopped: AtomicBool,
}

impl InMemorySessionCache {
    pub fn new(name: &str, container: &str, capabilities: CacheCapabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            container: container.to_string(),
            address: address(LOCAL_ADDRESS),
            capabilities,
            memory: Mutex::new(HashMap::new()),
            store: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            batch_depth: Mutex::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn clustered(name: &str, container: &str) -> Arc<Self> {
        Self::new(
            name,
            container,
            CacheCapabilities {
                batching: true,
                distributed: true,
                passivation: true,
            },
        )
    }

    pub fn standalone(name: &str, container: &str) -> Arc<Self> {
        Self::new(
            name,
            container,
            CacheCapabilities {
                batching: true,
                distributed: false,
                passivation: false,
            },
        )
    }

    fn record_op(&self, op: &'static str, flags: InvocationFlags) {
        self.ops.lock().unwrap().push(RecordedOp { op, flags });
    }

    pub fn recorded_ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn last_op(&self) -> Option<RecordedOp> {
        self.ops.lock().unwrap().last().cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Returns the record as held by the backing store.
    pub fn stored_record(&self, key: &SessionId) -> Option<SessionRecord> {
        self.store.lock().unwrap().get(key).cloned()
    }

    /// Returns `true` if an in-memory copy currently exists.
    pub fn in_memory(&self, key: &SessionId) -> bool {
        self.memory.lock().unwrap().contains_key(key)
    }

    fn dispatch(&self, event: CacheEvent) {
        let handlers: Vec<Arc<dyn CacheEventHandler>> =
            self.handlers.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            handler.on_event(event.clone());
        }
    }

    /// Injects a record change as another node would produce it.
    pub fn fire_remote_modified(&self, key: &SessionId, record: SessionRecord) {
        self.store
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        self.dispatch(CacheEvent {
            key: key.clone(),
            value: Some(record),
            kind: CacheEventKind::Modified,
            pre: false,
            origin_local: false,
        });
    }

    /// Injects a removal as another node would produce it.
    pub fn fire_remote_removed(&self, key: &SessionId) {
        self.store.lock().unwrap().remove(key);
        self.memory.lock().unwrap().remove(key);
        self.dispatch(CacheEvent {
            key: key.clone(),
            value: None,
            kind: CacheEventKind::Removed,
            pre: false,
            origin_local: false,
        });
    }

    /// Injects a raw event with full control over its fields.
    pub fn fire_event(&self, event: CacheEvent) {
        self.dispatch(event);
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn container_name(&self) -> &str {
        &self.container
    }

    fn local_address(&self) -> NodeAddress {
        self.address
    }

    fn capabilities(&self) -> CacheCapabilities {
        self.capabilities
    }

    async fn get(&self, key: &SessionId, flags: InvocationFlags) -> Result<Option<SessionRecord>> {
        self.record_op("get", flags);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated transport failure".to_string(),
            ));
        }

        if let Some(record) = self.memory.lock().unwrap().get(key) {
            return Ok(Some(record.clone()));
        }

        if flags.contains(Flag::SkipCacheLoad) || flags.contains(Flag::CacheModeLocal) {
            return Ok(None);
        }

        // Reload from the backing store, as a passivating cache would.
        let reloaded = self.store.lock().unwrap().get(key).cloned();
        if let Some(record) = reloaded {
            self.memory
                .lock()
                .unwrap()
                .insert(key.clone(), record.clone());
            self.dispatch(CacheEvent {
                key: key.clone(),
                value: Some(record.clone()),
                kind: CacheEventKind::Activated,
                pre: false,
                origin_local: true,
            });
            return Ok(Some(record));
        }

        Ok(None)
    }

    async fn put(
        &self,
        key: &SessionId,
        record: SessionRecord,
        flags: InvocationFlags,
    ) -> Result<()> {
        self.record_op("put", flags);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated transport failure".to_string(),
            ));
        }

        self.memory
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        self.store
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        self.dispatch(CacheEvent {
            key: key.clone(),
            value: Some(record),
            kind: CacheEventKind::Modified,
            pre: false,
            origin_local: true,
        });
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &SessionId,
        record: SessionRecord,
        flags: InvocationFlags,
    ) -> Result<SessionRecord> {
        self.record_op("put_if_absent", flags);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated transport failure".to_string(),
            ));
        }

        if let Some(existing) = self.memory.lock().unwrap().get(key) {
            return Ok(existing.clone());
        }
        if let Some(existing) = self.store.lock().unwrap().get(key) {
            return Ok(existing.clone());
        }

        self.memory
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        self.store
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        Ok(record)
    }

    async fn remove(&self, key: &SessionId, flags: InvocationFlags) -> Result<()> {
        self.record_op("remove", flags);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated transport failure".to_string(),
            ));
        }

        let existed = self.memory.lock().unwrap().remove(key).is_some();
        if flags.contains(Flag::CacheModeLocal) {
            return Ok(());
        }

        let stored = self.store.lock().unwrap().remove(key).is_some();
        if existed || stored {
            self.dispatch(CacheEvent {
                key: key.clone(),
                value: None,
                kind: CacheEventKind::Removed,
                pre: false,
                origin_local: true,
            });
        }
        Ok(())
    }

    async fn evict(&self, key: &SessionId) -> Result<()> {
        self.record_op("evict", InvocationFlags::none());
        self.memory.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<SessionId>> {
        Ok(self.store.lock().unwrap().keys().cloned().collect())
    }

    async fn start_batch(&self) -> Result<bool> {
        let mut depth = self.batch_depth.lock().unwrap();
        *depth += 1;
        Ok(*depth == 1)
    }

    async fn end_batch(&self, success: bool) {
        let mut depth = self.batch_depth.lock().unwrap();
        *depth = depth.saturating_sub(1);
        if success {
            self.commits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn subscribe(&self, handler: Arc<dyn CacheEventHandler>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.handlers.lock().unwrap().insert(id, handler);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.lock().unwrap().remove(&id);
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// One recorded `session_changed_in_distributed_cache` callback.
#[derive(Debug, Clone)]
pub struct RecordedChange {
    pub session_id: SessionId,
    pub version: u64,
    pub timestamp: u64,
    pub owner: DataOwner,
}

/// Recording [`LocalSessionManager`] double with an in-memory version floor
/// for conflict resolution.
#[derive(Default)]
pub struct RecordingSessionManager {
    route: Option<String>,
    invalidations: Mutex<Vec<SessionId>>,
    changes: Mutex<Vec<RecordedChange>>,
    activations: AtomicUsize,
    versions: Mutex<HashMap<SessionId, u64>>,
    fail_callbacks: AtomicBool,
}

impl RecordingSessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_route(route: &str) -> Arc<Self> {
        Arc::new(Self {
            route: Some(route.to_string()),
            ..Self::default()
        })
    }

    /// Sets the in-memory version the manager believes it has for a session.
    pub fn set_known_version(&self, session_id: &SessionId, version: u64) {
        self.versions
            .lock()
            .unwrap()
            .insert(session_id.clone(), version);
    }

    pub fn fail_callbacks(&self, fail: bool) {
        self.fail_callbacks.store(fail, Ordering::SeqCst);
    }

    pub fn invalidations(&self) -> Vec<SessionId> {
        self.invalidations.lock().unwrap().clone()
    }

    pub fn changes(&self) -> Vec<RecordedChange> {
        self.changes.lock().unwrap().clone()
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl LocalSessionManager for RecordingSessionManager {
    fn notify_remote_invalidation(&self, session_id: &SessionId) -> Result<()> {
        if self.fail_callbacks.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated callback failure".to_string(),
            ));
        }
        self.invalidations.lock().unwrap().push(session_id.clone());
        Ok(())
    }

    fn session_changed_in_distributed_cache(
        &self,
        session_id: &SessionId,
        owner: &DataOwner,
        version: u64,
        timestamp: u64,
        _metadata: &SessionMetadata,
    ) -> Result<bool> {
        if self.fail_callbacks.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated callback failure".to_string(),
            ));
        }

        self.changes.lock().unwrap().push(RecordedChange {
            session_id: session_id.clone(),
            version,
            timestamp,
            owner: owner.clone(),
        });

        let mut versions = self.versions.lock().unwrap();
        let known = versions.get(session_id).copied().unwrap_or(0);
        if version > known {
            versions.insert(session_id.clone(), version);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn session_activated(&self) -> Result<()> {
        if self.fail_callbacks.load(Ordering::SeqCst) {
            return Err(SessionGridError::Replication(
                "simulated callback failure".to_string(),
            ));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn route_identifier(&self) -> Option<String> {
        self.route.clone()
    }
}

/// In-memory [`RoutingRegistry`] double with put-if-absent semantics.
#[derive(Default)]
pub struct MapRoutingRegistry {
    routes: Mutex<HashMap<NodeAddress, String>>,
}

impl MapRoutingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_route(&self, address: NodeAddress, route: &str) {
        self.routes.lock().unwrap().insert(address, route.to_string());
    }

    pub fn routes(&self) -> HashMap<NodeAddress, String> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoutingRegistry for MapRoutingRegistry {
    async fn publish(&self, address: NodeAddress, route: String) -> Result<()> {
        self.routes.lock().unwrap().entry(address).or_insert(route);
        Ok(())
    }

    async fn route_of(&self, address: &NodeAddress) -> Result<Option<String>> {
        Ok(self.routes.lock().unwrap().get(address).cloned())
    }
}

/// Configurable [`LocalityOracle`] double.
pub struct StaticLocalityOracle {
    locality: Mutex<Locality>,
    owners: Mutex<Vec<NodeAddress>>,
    rehash: AtomicBool,
}

impl StaticLocalityOracle {
    pub fn local() -> Arc<Self> {
        Arc::new(Self {
            locality: Mutex::new(Locality::Local),
            owners: Mutex::new(vec![address(LOCAL_ADDRESS)]),
            rehash: AtomicBool::new(false),
        })
    }

    pub fn remote(owners: Vec<NodeAddress>) -> Arc<Self> {
        Arc::new(Self {
            locality: Mutex::new(Locality::Remote),
            owners: Mutex::new(owners),
            rehash: AtomicBool::new(false),
        })
    }

    pub fn set_locality(&self, locality: Locality) {
        *self.locality.lock().unwrap() = locality;
    }

    pub fn set_rehash_in_progress(&self, rehash: bool) {
        self.rehash.store(rehash, Ordering::SeqCst);
    }
}

impl LocalityOracle for StaticLocalityOracle {
    fn locality(&self, _key: &SessionId) -> Locality {
        *self.locality.lock().unwrap()
    }

    fn owners_of(&self, _key: &SessionId) -> Vec<NodeAddress> {
        self.owners.lock().unwrap().clone()
    }

    fn rehash_in_progress(&self) -> bool {
        self.rehash.load(Ordering::SeqCst)
    }
}

/// Counting [`DistributedLock`] double.
#[derive(Default)]
pub struct InMemoryLockService {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub acquisitions: AtomicUsize,
    pub releases: AtomicUsize,
    time_out: AtomicBool,
}

impl InMemoryLockService {
    pub fn time_out(&self, time_out: bool) {
        self.time_out.store(time_out, Ordering::SeqCst);
    }
}

#[async_trait]
impl DistributedLock for InMemoryLockService {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
        _new_claim: bool,
    ) -> Result<LockAcquisition> {
        if self.time_out.load(Ordering::SeqCst) {
            return Err(SessionGridError::LockTimeout(format!(
                "lock {key} not acquired within {timeout:?}"
            )));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(LockAcquisition::Acquired)
    }

    async fn release(&self, _key: &str, _remove: bool) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// [`LockProvider`] double that remembers every service it created.
#[derive(Default)]
pub struct CountingLockProvider {
    created: Mutex<Vec<Arc<InMemoryLockService>>>,
}

impl CountingLockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn services(&self) -> Vec<Arc<InMemoryLockService>> {
        self.created.lock().unwrap().clone()
    }
}

impl LockProvider for CountingLockProvider {
    fn create(&self, _container_name: &str) -> Arc<dyn DistributedLock> {
        let service = Arc::new(InMemoryLockService::default());
        self.created.lock().unwrap().push(Arc::clone(&service));
        service
    }
}

/// Everything a manager test needs, wired through the real factory.
pub struct Harness {
    pub cache: Arc<InMemorySessionCache>,
    pub session_manager: Arc<RecordingSessionManager>,
    pub routing: Arc<MapRoutingRegistry>,
    pub lock_provider: Arc<CountingLockProvider>,
    pub lock_registry: Arc<LockManagerRegistry>,
    pub manager: Arc<DistributedCacheManager>,
}

/// Builds a manager over the given doubles without starting it.
pub async fn compose_manager(
    config: ReplicationConfig,
    cache: Arc<InMemorySessionCache>,
    session_manager: Arc<RecordingSessionManager>,
    locality: Option<Arc<StaticLocalityOracle>>,
) -> Harness {
    let routing = MapRoutingRegistry::new();
    let lock_provider = CountingLockProvider::new();
    let lock_registry = Arc::new(LockManagerRegistry::new(
        Arc::clone(&lock_provider) as Arc<dyn LockProvider>
    ));

    let factory = DistributedCacheManagerFactory::new(
        Arc::clone(&lock_registry),
        Arc::clone(&routing) as Arc<dyn RoutingRegistry>,
        Arc::new(JsonMarshaller::new()),
    );

    let manager = factory
        .create_manager(
            &config,
            Arc::clone(&cache) as Arc<dyn SessionCache>,
            Arc::clone(&session_manager) as Arc<dyn LocalSessionManager>,
            locality.map(|oracle| oracle as Arc<dyn LocalityOracle>),
        )
        .await
        .expect("failed to compose manager");

    Harness {
        cache,
        session_manager,
        routing,
        lock_provider,
        lock_registry,
        manager,
    }
}

/// Builds and starts a manager over the given doubles.
pub async fn started_manager(
    config: ReplicationConfig,
    cache: Arc<InMemorySessionCache>,
    session_manager: Arc<RecordingSessionManager>,
    locality: Option<Arc<StaticLocalityOracle>>,
) -> Harness {
    let harness = compose_manager(config, cache, session_manager, locality).await;
    harness.manager.start().await.expect("failed to start manager");
    harness
}

/// Builds a whole-session outgoing payload.
pub fn outgoing(id: &str, version: u64, attributes: SessionAttributes) -> OutgoingSessionData {
    OutgoingSessionData {
        session_id: SessionId::new(id),
        version,
        timestamp: 1_000 + version,
        metadata: SessionMetadata::new(id, 1_000, 1800),
        changes: AttributeChanges::Whole(Some(attributes)),
    }
}

/// Builds a per-attribute outgoing payload.
pub fn outgoing_delta(
    id: &str,
    version: u64,
    modified: SessionAttributes,
    removed: HashSet<String>,
) -> OutgoingSessionData {
    OutgoingSessionData {
        session_id: SessionId::new(id),
        version,
        timestamp: 1_000 + version,
        metadata: SessionMetadata::new(id, 1_000, 1800),
        changes: AttributeChanges::Delta { modified, removed },
    }
}

/// Builds an attribute map from JSON-literal pairs.
pub fn attrs(entries: &[(&str, serde_json::Value)]) -> SessionAttributes {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
