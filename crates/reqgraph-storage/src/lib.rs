//! Persistence for the requirements graph.
//!
//! Nodes live in SQLite: a generic `node(id, node_type)` row, one row per
//! edge in `node_associations`, and a detail row in the table of the node's
//! kind. Saving and loading run as tasks on a [`WorkerPool`] so callers are
//! never blocked on the database.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`schema`]: migrations and connection pragmas
//! - [`database`]: Database handle and DatabaseConfig
//! - [`codec`]: NodeCodec trait, per-kind codecs and the CodecRegistry
//! - [`signal`]: completion signals
//! - [`pool`]: WorkerPool and the Task trait
//! - [`saver`]: SaveTask
//! - [`loader`]: NodeAllocator, NodeLoadTask and GraphFactory
//! - [`remover`]: RemoveTask
//! - [`locator`]: GraphLocator

pub mod codec;
pub mod database;
pub mod error;
pub mod loader;
pub mod locator;
pub mod pool;
pub mod remover;
pub mod saver;
pub mod schema;
pub mod signal;

// Re-export key types for ergonomic use.
pub use codec::{BaseCodec, CodecRegistry, KindCodec, NodeCodec, UnknownCodec};
pub use database::{Database, DatabaseConfig};
pub use error::StorageError;
pub use loader::{GraphFactory, LoadEvent, NodeAllocator, NodeLoadTask};
pub use locator::GraphLocator;
pub use pool::{PoolHandle, PoolState, Task, TaskHeader, TaskId, TaskRef, WorkerPool};
pub use remover::RemoveTask;
pub use saver::{SaveEvent, SaveScope, SaveTask};
pub use signal::Signal;
