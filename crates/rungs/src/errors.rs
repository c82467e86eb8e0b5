//! Error handling for rungs
//!
//! Every failure an install run can hit is surfaced to the caller as one of the
//! types below. Each error is classified by an [`ErrorKind`] carrying a stable
//! code that tests and log events can match on.

use thiserror::Error;

/// Result type alias for version store operations
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Canonical error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening or configuring a connection failed
    Connection,
    /// Reading the stored version failed for a reason other than a missing table
    VersionRead,
    /// Creating the version table or its initial row failed
    VersionInit,
    /// The version update statement failed
    VersionWrite,
    /// The version update did not touch exactly one row
    VersionRowCount,
    /// Beginning the migration transaction failed
    TransactionStart,
    /// A registered migration step returned an error
    StepFailed,
    /// Committing the migration transaction failed
    Commit,
    /// The installer configuration is invalid
    Config,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "ERR_CONNECTION",
            ErrorKind::VersionRead => "ERR_VERSION_READ",
            ErrorKind::VersionInit => "ERR_VERSION_INIT",
            ErrorKind::VersionWrite => "ERR_VERSION_WRITE",
            ErrorKind::VersionRowCount => "ERR_VERSION_ROW_COUNT",
            ErrorKind::TransactionStart => "ERR_TRANSACTION_START",
            ErrorKind::StepFailed => "ERR_STEP_FAILED",
            ErrorKind::Commit => "ERR_COMMIT",
            ErrorKind::Config => "ERR_CONFIG",
        }
    }
}

/// Errors raised by the version store and connection helpers
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database connection")]
    Connection(#[source] rusqlite::Error),

    #[error("failed to read schema version from table '{table}'")]
    VersionRead {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to initialize version table '{table}'")]
    VersionInit {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to write schema version {version} to table '{table}'")]
    VersionWrite {
        table: String,
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("version update on table '{table}' affected {affected} rows, expected exactly 1")]
    VersionRowCount { table: String, affected: usize },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::VersionRead { .. } => ErrorKind::VersionRead,
            StoreError::VersionInit { .. } => ErrorKind::VersionInit,
            StoreError::VersionWrite { .. } => ErrorKind::VersionWrite,
            StoreError::VersionRowCount { .. } => ErrorKind::VersionRowCount,
        }
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Errors returned by [`Schema::install`](crate::Schema::install)
///
/// `E` is the error type returned by the registered migration steps. A step
/// failure keeps the caller's original error intact; use
/// [`InstallError::into_step_error`] to get it back.
///
/// When a failed run cannot be rolled back cleanly, the rollback failure is
/// attached as `rollback_error` next to the error that triggered the rollback.
#[derive(Error, Debug)]
pub enum InstallError<E> {
    #[error(transparent)]
    Version(StoreError),

    #[error("failed to begin migration transaction")]
    TransactionStart(#[source] rusqlite::Error),

    #[error("migration step {index} (min_version {min_version}) failed")]
    Step {
        index: usize,
        min_version: u32,
        #[source]
        source: E,
        rollback_error: Option<rusqlite::Error>,
    },

    #[error("failed to record target schema version")]
    VersionWrite {
        #[source]
        source: StoreError,
        rollback_error: Option<rusqlite::Error>,
    },

    #[error("failed to commit migration transaction")]
    Commit(#[source] rusqlite::Error),
}

impl<E> InstallError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::Version(err) => err.kind(),
            InstallError::TransactionStart(_) => ErrorKind::TransactionStart,
            InstallError::Step { .. } => ErrorKind::StepFailed,
            InstallError::VersionWrite { source, .. } => source.kind(),
            InstallError::Commit(_) => ErrorKind::Commit,
        }
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// The error a migration step returned, if this run failed in a step
    pub fn step_error(&self) -> Option<&E> {
        match self {
            InstallError::Step { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consume the error and return the failing step's original error
    pub fn into_step_error(self) -> Option<E> {
        match self {
            InstallError::Step { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The error raised while rolling back a failed run, if any
    pub fn rollback_error(&self) -> Option<&rusqlite::Error> {
        match self {
            InstallError::Step { rollback_error, .. }
            | InstallError::VersionWrite { rollback_error, .. } => rollback_error.as_ref(),
            _ => None,
        }
    }
}

impl<E> From<StoreError> for InstallError<E> {
    fn from(err: StoreError) -> Self {
        InstallError::Version(err)
    }
}

/// Errors raised while building an installer configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse installer configuration")]
    Parse(#[from] toml::de::Error),

    #[error("invalid version table name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
