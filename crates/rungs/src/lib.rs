//! rungs - ordered, versioned schema migrations for SQLite
//!
//! Provides:
//! - A version store keeping the schema version in a one-row table
//! - A migration runner applying gated steps in registration order, in one transaction
//! - Installer configuration (TOML) and connection helpers
//! - Structured logging facility and typed errors with stable codes

pub mod config;
pub mod db;
pub mod errors;
pub mod logging_facility;
pub mod schema;
pub mod version_store;

pub use rungs_core_types as core_types;

pub use rusqlite;

#[doc(hidden)]
pub use tracing;

// Re-export key types
pub use config::{InstallerConfig, LockMode, VersionTable};
pub use errors::{ConfigError, ErrorKind, InstallError, StoreError};
pub use schema::{InstallReport, MigrationStep, Schema};
pub use version_store::{get_version, set_version, VersionStore};
