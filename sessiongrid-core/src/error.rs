//! Error types for session replication operations.

use std::io;
use thiserror::Error;

/// The main error type for session replication operations.
#[derive(Debug, Error)]
pub enum SessionGridError {
    /// Replication-related errors (transport failures during store/remove).
    #[error("replication error: {0}")]
    Replication(String),

    /// Serialization/deserialization errors for session attributes.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Lock acquisition timed out before ownership could be granted.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// Lock-service errors other than timeouts.
    #[error("lock error: {0}")]
    Lock(String),

    /// Configuration errors (unsupported granularity, missing cache
    /// capability, wrong-typed record slot).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lifecycle violations (operation on a stopped manager, restart).
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for session replication operations.
pub type Result<T> = std::result::Result<T, SessionGridError>;
