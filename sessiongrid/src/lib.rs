//! Clustered HTTP session replication over a distributed cache.
//!
//! This crate keeps the sessions of a distributable web deployment
//! consistent across a cluster. A node-local session manager calls in to
//! persist, load and remove session state; the crate replicates that state
//! through an abstract distributed cache, enforces single-owner semantics
//! with a cluster-wide lock, decides which node should serve a session's
//! next request, and feeds remote changes back into the local session
//! manager.
//!
//! The replicated cache engine itself is an external collaborator: anything
//! providing the [`SessionCache`] contract (a distributed map with
//! flag-scoped operations, an invocation batch boundary, and a
//! change-notification stream) can carry the session records. The same goes
//! for the distributed lock ([`DistributedLock`]), the routing registry and
//! the optional locality oracle.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use sessiongrid::{
//!     DistributedCacheManagerFactory, JsonMarshaller, LockManagerRegistry, ReplicationConfig,
//!     ReplicationGranularity,
//! };
//!
//! let factory = DistributedCacheManagerFactory::new(
//!     Arc::new(LockManagerRegistry::new(lock_provider)),
//!     routing_registry,
//!     Arc::new(JsonMarshaller::new()),
//! );
//!
//! let config = ReplicationConfig::builder()
//!     .granularity(ReplicationGranularity::Attribute)
//!     .build();
//!
//! let manager = factory
//!     .create_manager(&config, cache, session_manager, Some(locality))
//!     .await?;
//! manager.start().await?;
//!
//! manager.store_session_data(&outgoing).await?;
//! let incoming = manager.get_session_data(&session_id, false).await;
//! ```
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`DistributedCacheManager`] | Per-deployment orchestrator: session CRUD, ownership, locality, change reactions |
//! | [`SessionAttributeStorage`] | Whole-session or per-attribute record serialization |
//! | [`ClusterLockManager`] / [`LockManagerRegistry`] | Cluster-wide session ownership, shared per container |
//! | [`ForceSynchronousCacheInvoker`] | Per-call synchronous-replication policy |
//! | [`DistributedCacheManagerFactory`] | Composition root, enforcing the batching precondition |

#![warn(missing_docs)]

pub mod cache;
pub mod config;
mod factory;
pub mod invoker;
pub mod local;
pub mod lock;
pub mod record;
pub mod routing;
pub mod storage;

mod manager;

pub use cache::{
    CacheCapabilities, CacheEvent, CacheEventHandler, CacheEventKind, Flag, InvocationFlags,
    NodeAddress, SessionCache, SubscriptionId,
};
pub use config::{ReplicationConfig, ReplicationConfigBuilder, ReplicationGranularity};
pub use factory::DistributedCacheManagerFactory;
pub use invoker::ForceSynchronousCacheInvoker;
pub use local::LocalSessionManager;
pub use lock::{
    ClusterLockManager, DistributedLock, LockAcquisition, LockManagerRegistry, LockProvider,
    LockResult,
};
pub use manager::{DistributedCacheManager, SessionOwnershipSupport};
pub use record::{FixedSlot, SessionRecord, SlotKey, SlotValue};
pub use routing::{Locality, LocalityOracle, RoutingRegistry};
pub use storage::{
    storage_for, CoarseSessionAttributeStorage, FineSessionAttributeStorage,
    SessionAttributeStorage, StorageGranularity,
};

pub use sessiongrid_core as core;
pub use sessiongrid_core::{
    AttributeChanges, AttributeMarshaller, AttributeValue, DataOwner, IncomingSessionData,
    JsonMarshaller, OutgoingSessionData, Result, SessionAttributes, SessionGridError, SessionId,
    SessionMetadata,
};
