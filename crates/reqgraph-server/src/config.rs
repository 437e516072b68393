//! Server configuration read from environment variables.
//!
//! - `REQGRAPH_DB_PATH`: SQLite database file path (default: "reqgraph.db")
//! - `REQGRAPH_PORT`: listen port (default: 3000)
//! - `REQGRAPH_WORKERS`: worker threads in the shared pool (default: 4)
//! - `REQGRAPH_LOAD_TIMEOUT_SECS`: how long `GET /graph/{id}` waits (default: 30)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DB_PATH_VAR: &str = "REQGRAPH_DB_PATH";
pub const PORT_VAR: &str = "REQGRAPH_PORT";
pub const WORKERS_VAR: &str = "REQGRAPH_WORKERS";
pub const LOAD_TIMEOUT_VAR: &str = "REQGRAPH_LOAD_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub workers: usize,
    pub load_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: PathBuf::from("reqgraph.db"),
            port: 3000,
            workers: 4,
            load_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset keys keep their default;
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ServerConfig::default();
        let db_path = lookup(DB_PATH_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let port = parsed(&lookup, PORT_VAR).unwrap_or(defaults.port);
        let workers = parsed::<usize>(&lookup, WORKERS_VAR)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.workers);
        let load_timeout = parsed::<u64>(&lookup, LOAD_TIMEOUT_VAR)
            .map(Duration::from_secs)
            .unwrap_or(defaults.load_timeout);
        ServerConfig {
            db_path,
            port,
            workers,
            load_timeout,
        }
    }

    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}
