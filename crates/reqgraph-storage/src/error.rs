//! Storage error types for reqgraph-storage.
//!
//! [`StorageError`] covers the failure modes of the persistence layer:
//! SQLite and migration failures, node types without a registered codec,
//! malformed stored ids, and errors bubbled up from the node model.

use reqgraph_core::CoreError;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The node model rejected an operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No codec is registered for the node's type.
    #[error("type not specialized: no codec for '{type_name}' ({operation})")]
    TypeNotRegistered {
        type_name: String,
        operation: &'static str,
    },

    /// A stored id could not be parsed.
    #[error("invalid stored id '{0}'")]
    InvalidId(String),

    /// A task was handed to a pool that no longer accepts work.
    #[error("worker pool is shut down")]
    PoolShutdown,
}
