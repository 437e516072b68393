//! Database handle.
//!
//! [`Database`] is a cheap, cloneable description of one SQLite database
//! plus the codec registry used to map nodes onto it. Every task opens its
//! own private connection with [`Database::connect`]; WAL mode and a busy
//! timeout let concurrent writers take turns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use crate::codec::CodecRegistry;
use crate::error::StorageError;
use crate::schema;

/// Where the database lives and how connections wait on each other.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// How long a connection waits for a competing writer.
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DatabaseConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("reqgraph.db"),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    config: Arc<DatabaseConfig>,
    codecs: Arc<CodecRegistry>,
}

impl Database {
    /// Opens (or creates) the database and applies pending migrations, using
    /// the standard codec registry.
    pub fn open(config: DatabaseConfig) -> Result<Self, StorageError> {
        Database::open_with_codecs(config, CodecRegistry::standard())
    }

    /// Opens the database file at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Database::open(DatabaseConfig::new(path.as_ref()))
    }

    pub fn open_with_codecs(
        config: DatabaseConfig,
        codecs: CodecRegistry,
    ) -> Result<Self, StorageError> {
        let mut conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;
        schema::configure_and_migrate(&mut conn)?;
        tracing::info!(path = %config.path.display(), codecs = codecs.len(), "database ready");
        Ok(Database {
            config: Arc::new(config),
            codecs: Arc::new(codecs),
        })
    }

    /// Opens a private connection for one task.
    pub fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout)?;
        schema::configure(&conn)?;
        Ok(conn)
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.config.path)
            .field("codecs", &self.codecs.len())
            .finish()
    }
}
