//! Replication configuration types and builders.

use std::str::FromStr;
use std::time::Duration;

use sessiongrid_core::SessionGridError;

use crate::storage::StorageGranularity;

/// Default lock-acquisition timeout for session ownership.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Replication granularity as it appears in deployment descriptors.
///
/// This is the parse-time enum; it still carries the deprecated `Field`
/// alias so legacy descriptors keep deploying. The runtime strategy variant
/// is [`StorageGranularity`], which has no deprecated case — translation
/// happens once, in [`ReplicationGranularity::storage_granularity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationGranularity {
    /// Replicate the whole attribute map as one unit.
    Session,
    /// Replicate each attribute independently.
    Attribute,
    /// Deprecated alias of `Session`, retained for legacy descriptors.
    Field,
}

impl ReplicationGranularity {
    /// Maps this configured granularity onto the runtime strategy variant.
    ///
    /// The deprecated `Field` granularity falls back to whole-session
    /// storage and logs one deprecation warning per translation.
    pub fn storage_granularity(self) -> StorageGranularity {
        match self {
            ReplicationGranularity::Session => StorageGranularity::Coarse,
            ReplicationGranularity::Attribute => StorageGranularity::Fine,
            ReplicationGranularity::Field => {
                tracing::warn!(
                    "FIELD replication granularity is deprecated; falling back to SESSION"
                );
                StorageGranularity::Coarse
            }
        }
    }
}

impl FromStr for ReplicationGranularity {
    type Err = SessionGridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SESSION" => Ok(ReplicationGranularity::Session),
            "ATTRIBUTE" => Ok(ReplicationGranularity::Attribute),
            "FIELD" => Ok(ReplicationGranularity::Field),
            other => Err(SessionGridError::Configuration(format!(
                "unsupported replication granularity: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ReplicationGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationGranularity::Session => write!(f, "SESSION"),
            ReplicationGranularity::Attribute => write!(f, "ATTRIBUTE"),
            ReplicationGranularity::Field => write!(f, "FIELD"),
        }
    }
}

/// Per-deployment replication configuration.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    granularity: ReplicationGranularity,
    lock_timeout: Duration,
    force_synchronous: bool,
}

impl ReplicationConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ReplicationConfigBuilder {
        ReplicationConfigBuilder::new()
    }

    /// Returns the configured replication granularity.
    pub fn granularity(&self) -> ReplicationGranularity {
        self.granularity
    }

    /// Returns the lock-acquisition timeout for session ownership.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Returns whether every replication call must be synchronous from the
    /// start, regardless of per-request routing decisions.
    pub fn force_synchronous(&self) -> bool {
        self.force_synchronous
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            granularity: ReplicationGranularity::Session,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            force_synchronous: false,
        }
    }
}

/// Builder for [`ReplicationConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReplicationConfigBuilder {
    granularity: Option<ReplicationGranularity>,
    lock_timeout: Option<Duration>,
    force_synchronous: bool,
}

impl ReplicationConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the replication granularity.
    pub fn granularity(mut self, granularity: ReplicationGranularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Sets the lock-acquisition timeout for session ownership.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Forces synchronous replication for every call.
    pub fn force_synchronous(mut self, force: bool) -> Self {
        self.force_synchronous = force;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ReplicationConfig {
        ReplicationConfig {
            granularity: self.granularity.unwrap_or(ReplicationGranularity::Session),
            lock_timeout: self.lock_timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT),
            force_synchronous: self.force_synchronous,
        }
    }
}
