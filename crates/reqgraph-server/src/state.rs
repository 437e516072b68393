//! Application state shared by every handler.
//!
//! [`AppState`] holds the database handle and one worker pool. Handlers never
//! touch SQLite on the async runtime: saves and loads are tasks on the pool,
//! and handlers that need a result wait for it on a blocking thread.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqgraph_storage::{Database, WorkerPool};

use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub pool: Arc<WorkerPool>,
    /// How long `GET /graph/{id}` waits for a load.
    pub load_timeout: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        AppState::open(&config.db_path, config.workers, config.load_timeout)
    }

    /// Opens (and migrates) the database at `path` and starts `workers`
    /// pool threads.
    pub fn open(path: &Path, workers: usize, load_timeout: Duration) -> Result<Self, ApiError> {
        let db = Database::open_path(path)?;
        let pool = WorkerPool::with_threads(workers);
        tracing::info!(path = %path.display(), workers = pool.worker_count(), "application state ready");
        Ok(AppState {
            db,
            pool: Arc::new(pool),
            load_timeout,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("pool", &self.pool.status())
            .field("load_timeout", &self.load_timeout)
            .finish()
    }
}
