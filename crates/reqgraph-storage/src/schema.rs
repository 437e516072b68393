//! SQL schema and migration setup.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial_schema.sql")),
        // Future migrations added here as new M::up(...) entries.
    ])
}

/// Sets the per-connection pragmas every connection needs.
pub fn configure(conn: &Connection) -> Result<(), StorageError> {
    // NORMAL synchronous is safe with WAL mode and provides better performance.
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Enable foreign key enforcement (off by default in SQLite).
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Configures pragmas and applies pending migrations.
pub fn configure_and_migrate(conn: &mut Connection) -> Result<(), StorageError> {
    // WAL lets worker connections read while one of them writes.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    configure(conn)?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}
