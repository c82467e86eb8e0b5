//! Database connection helpers
//!
//! Thin wrappers for opening SQLite connections and applying the connection
//! settings an installer needs. Callers that manage their own connections can
//! skip this module and pass any `rusqlite::Connection` to
//! [`Schema::install`](crate::Schema::install).

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::InstallerConfig;
use crate::errors::{Result, StoreError};

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(StoreError::Connection)
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(StoreError::Connection)
}

/// Apply connection settings from `config`
///
/// Sets the busy timeout when one is configured, so an installer waiting on
/// another installer's write lock retries instead of failing immediately.
///
/// Always turns on `PRAGMA foreign_keys` (off by default in SQLite). Deferred
/// key violations then fail the run at commit.
pub fn configure(conn: &Connection, config: &InstallerConfig) -> Result<()> {
    if let Some(millis) = config.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(millis))
            .map_err(StoreError::Connection)?;
    }

    conn.pragma_update(None, "foreign_keys", true)
        .map_err(StoreError::Connection)?;

    Ok(())
}
