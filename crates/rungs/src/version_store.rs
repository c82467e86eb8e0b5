//! Version store
//!
//! Persists the schema version as a single integer in a single row of a
//! dedicated table. A missing table or a missing row reads as version 0 and is
//! created on first access.

use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction};
use rungs_core_types::schema::OP_VERSION_INIT;

use crate::config::{InstallerConfig, VersionTable};
use crate::errors::{Result, StoreError};

/// Reads and writes the persisted schema version
#[derive(Debug, Clone)]
pub struct VersionStore {
    table: VersionTable,
    verify_row_count: bool,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new(VersionTable::default())
    }
}

impl VersionStore {
    pub fn new(table: VersionTable) -> Self {
        Self {
            table,
            verify_row_count: true,
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self {
            table: config.version_table.clone(),
            verify_row_count: config.verify_row_count,
        }
    }

    pub fn table(&self) -> &VersionTable {
        &self.table
    }

    /// Read the stored version, initializing the table on first use
    ///
    /// Table creation and the initial row insert run outside any migration
    /// transaction. Only a "no such table" failure counts as uninitialized;
    /// every other read failure is returned as [`StoreError::VersionRead`].
    pub fn get_version(&self, conn: &Connection) -> Result<u32> {
        match self.read(conn) {
            Ok(Some(version)) => Ok(version),
            Ok(None) => {
                self.insert_initial_row(conn)?;
                Ok(0)
            }
            Err(err) if is_missing_table(&err) => {
                self.create_table(conn)?;
                self.insert_initial_row(conn)?;
                Ok(0)
            }
            Err(source) => Err(StoreError::VersionRead {
                table: self.table.to_string(),
                source,
            }),
        }
    }

    /// Re-read the version inside an open transaction
    ///
    /// The row is expected to exist already; a missing row reads as 0.
    pub(crate) fn read_in(&self, tx: &Transaction<'_>) -> Result<u32> {
        self.read(tx)
            .map(Option::unwrap_or_default)
            .map_err(|source| StoreError::VersionRead {
                table: self.table.to_string(),
                source,
            })
    }

    /// Write `version` as part of the caller's transaction
    pub fn set_version(&self, tx: &Transaction<'_>, version: u32) -> Result<()> {
        let affected = tx
            .execute(
                &format!("UPDATE {} SET version = ?1", self.table.quoted()),
                [version],
            )
            .map_err(|source| StoreError::VersionWrite {
                table: self.table.to_string(),
                version,
                source,
            })?;

        if self.verify_row_count && affected != 1 {
            return Err(StoreError::VersionRowCount {
                table: self.table.to_string(),
                affected,
            });
        }

        Ok(())
    }

    fn read(&self, conn: &Connection) -> rusqlite::Result<Option<u32>> {
        conn.query_row(
            &format!("SELECT version FROM {}", self.table.quoted()),
            [],
            |row| row.get(0),
        )
        .optional()
    }

    fn create_table(&self, conn: &Connection) -> Result<()> {
        tracing::info!(
            component = module_path!(),
            op = OP_VERSION_INIT,
            version_table = self.table.as_str(),
            "creating version table"
        );

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (version INTEGER NOT NULL)",
                self.table.quoted()
            ),
            [],
        )
        .map_err(|source| self.init_error(source))?;

        Ok(())
    }

    fn insert_initial_row(&self, conn: &Connection) -> Result<()> {
        let table = self.table.quoted();
        conn.execute(
            &format!(
                "INSERT INTO {table} (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM {table})"
            ),
            [],
        )
        .map_err(|source| self.init_error(source))?;

        Ok(())
    }

    fn init_error(&self, source: rusqlite::Error) -> StoreError {
        StoreError::VersionInit {
            table: self.table.to_string(),
            source,
        }
    }
}

/// Read the version from the default `version` table
pub fn get_version(conn: &Connection) -> Result<u32> {
    VersionStore::default().get_version(conn)
}

/// Write the version to the default `version` table within `tx`
pub fn set_version(tx: &Transaction<'_>, version: u32) -> Result<()> {
    VersionStore::default().set_version(tx, version)
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::Unknown && msg.starts_with("no such table")
        }
        _ => false,
    }
}
