//! Migration runner
//!
//! A [`Schema`] is an ordered list of `(min_version, action)` steps built once
//! at startup. [`Schema::install`] applies, inside one transaction, every step
//! whose `min_version` is strictly greater than the stored version, in the
//! order the steps were registered, then stores the target version.
//!
//! Registration order is the contract. `min_version` only gates whether a step
//! runs; steps are never sorted by it.
//!
//! ```
//! use rungs::Schema;
//!
//! let mut schema = Schema::new();
//! schema
//!     .register(1, |_, tx| tx.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)"))
//!     .register(2, |_, tx| tx.execute_batch("ALTER TABLE users ADD COLUMN name TEXT"));
//!
//! let mut conn = rusqlite::Connection::open_in_memory()?;
//! let report = schema.install(&mut conn, 2).expect("install");
//! assert_eq!(report.applied, vec![0, 1]);
//! # Ok::<(), rusqlite::Error>(())
//! ```

use std::fmt;
use std::time::Instant;

use rusqlite::{Connection, Transaction};
use rungs_core_types::schema::OP_INSTALL;

use crate::config::{InstallerConfig, LockMode};
use crate::errors::InstallError;
use crate::version_store::VersionStore;
use crate::{log_op_end, log_op_error, log_op_start};

/// Boxed migration action: receives the pre-run version and the run's transaction
pub type StepFn<E> = Box<dyn Fn(u32, &Transaction<'_>) -> Result<(), E>>;

/// A unit of schema-changing work gated by a minimum version
pub struct MigrationStep<E> {
    min_version: u32,
    action: StepFn<E>,
}

impl<E> MigrationStep<E> {
    pub fn min_version(&self) -> u32 {
        self.min_version
    }

    /// Whether this step runs against a database at `version`
    pub fn applies_to(&self, version: u32) -> bool {
        self.min_version > version
    }

    fn run(&self, version: u32, tx: &Transaction<'_>) -> Result<(), E> {
        (self.action)(version, tx)
    }
}

impl<E> fmt::Debug for MigrationStep<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful install run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Version read at the start of the run
    pub previous_version: u32,
    /// Version written at the end of the run (the caller's target)
    pub version: u32,
    /// Registration indices of the steps that ran, in the order they ran
    pub applied: Vec<usize>,
}

/// Ordered, append-only list of migration steps
///
/// `E` is the error type the steps return. It defaults to `rusqlite::Error`,
/// which fits steps that only issue SQL.
pub struct Schema<E = rusqlite::Error> {
    steps: Vec<MigrationStep<E>>,
    config: InstallerConfig,
    store: VersionStore,
}

impl<E> Default for Schema<E> {
    fn default() -> Self {
        Self::with_config(InstallerConfig::default())
    }
}

impl<E> fmt::Debug for Schema<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish()
    }
}

impl<E> Schema<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InstallerConfig) -> Self {
        Self {
            steps: Vec::new(),
            store: VersionStore::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn version_store(&self) -> &VersionStore {
        &self.store
    }

    /// Append a step
    ///
    /// No ordering or duplicate checks are made on `min_version`; steps run in
    /// the order they are registered.
    pub fn register<F>(&mut self, min_version: u32, action: F) -> &mut Self
    where
        F: Fn(u32, &Transaction<'_>) -> Result<(), E> + 'static,
    {
        self.steps.push(MigrationStep {
            min_version,
            action: Box::new(action),
        });
        self
    }

    pub fn steps(&self) -> &[MigrationStep<E>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Registration indices of the steps that would run against `version`
    pub fn pending(&self, version: u32) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.applies_to(version))
            .map(|(index, _)| index)
            .collect()
    }

    /// Bring the database from its stored version to `target_version`
    ///
    /// All applied steps and the version write share one transaction. The
    /// first failing step aborts the run and rolls everything back.
    /// `target_version` is stored as given, whatever the steps' thresholds.
    ///
    /// ## Errors
    ///
    /// - `Version`: reading or initializing the version table failed (no
    ///   transaction was opened)
    /// - `TransactionStart`: the transaction could not be started
    /// - `Step`: a step failed; carries the step's own error
    /// - `VersionWrite`: storing `target_version` failed
    /// - `Commit`: the final commit failed
    pub fn install(
        &self,
        conn: &mut Connection,
        target_version: u32,
    ) -> Result<InstallReport, InstallError<E>> {
        log_op_start!(
            OP_INSTALL,
            target_version = target_version,
            version_table = self.store.table().as_str(),
            steps = self.steps.len()
        );
        let start = Instant::now();

        let result = self.install_impl(conn, target_version);

        match &result {
            Ok(report) => {
                log_op_end!(
                    OP_INSTALL,
                    duration_ms = start.elapsed().as_millis() as u64,
                    from_version = report.previous_version,
                    target_version = report.version,
                    applied = report.applied.len()
                );
            }
            Err(err) => {
                log_op_error!(
                    OP_INSTALL,
                    err,
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }

        result
    }

    fn install_impl(
        &self,
        conn: &mut Connection,
        target_version: u32,
    ) -> Result<InstallReport, InstallError<E>> {
        let mut version = self.store.get_version(conn)?;

        let mut tx = conn
            .transaction_with_behavior(self.config.lock.behavior())
            .map_err(InstallError::TransactionStart)?;

        if self.config.lock == LockMode::Immediate {
            // Another installer may have committed between the read and the lock
            (tx, version) = self.read_under_lock(tx)?;
        }

        let mut applied = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            if !step.applies_to(version) {
                tracing::trace!(
                    component = module_path!(),
                    op = OP_INSTALL,
                    step_index = index,
                    min_version = step.min_version(),
                    "skipping migration step"
                );
                continue;
            }

            tracing::debug!(
                component = module_path!(),
                op = OP_INSTALL,
                step_index = index,
                min_version = step.min_version(),
                from_version = version,
                "applying migration step"
            );

            if let Err(source) = step.run(version, &tx) {
                let rollback_error = rollback(tx);
                return Err(InstallError::Step {
                    index,
                    min_version: step.min_version(),
                    source,
                    rollback_error,
                });
            }
            applied.push(index);
        }

        if let Err(source) = self.store.set_version(&tx, target_version) {
            let rollback_error = rollback(tx);
            return Err(InstallError::VersionWrite {
                source,
                rollback_error,
            });
        }

        tx.commit().map_err(InstallError::Commit)?;

        Ok(InstallReport {
            previous_version: version,
            version: target_version,
            applied,
        })
    }

    /// Re-read the version inside a write-locked transaction
    ///
    /// On failure the transaction is rolled back before the error is returned.
    fn read_under_lock<'c>(
        &self,
        tx: Transaction<'c>,
    ) -> Result<(Transaction<'c>, u32), InstallError<E>> {
        match self.store.read_in(&tx) {
            Ok(version) => Ok((tx, version)),
            Err(err) => {
                rollback(tx);
                Err(err.into())
            }
        }
    }
}

/// Roll back a failed run, returning the rollback's own failure if any
fn rollback(tx: Transaction<'_>) -> Option<rusqlite::Error> {
    tx.rollback()
        .map_err(|err| {
            tracing::warn!(
                component = module_path!(),
                op = OP_INSTALL,
                error = %err,
                "rollback of failed install run failed"
            );
            err
        })
        .err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, StoreError};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(
        log: &Log,
        name: &'static str,
    ) -> impl Fn(u32, &Transaction<'_>) -> rusqlite::Result<()> {
        let log = log.clone();
        move |_, _| {
            log.lock().unwrap().push(name);
            Ok(())
        }
    }

    fn db_at(version: u32) -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        let schema: Schema = Schema::new();
        schema.install(&mut conn, version).unwrap();
        conn
    }

    #[test]
    fn test_registration_order_not_min_version_order() {
        let log = Log::default();
        let mut schema = Schema::new();
        schema
            .register(1, recorder(&log, "A"))
            .register(3, recorder(&log, "B"))
            .register(2, recorder(&log, "C"));

        let mut conn = Connection::open_in_memory().unwrap();
        let report = schema.install(&mut conn, 5).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(report.applied, vec![0, 1, 2]);
        assert_eq!(report.previous_version, 0);
        assert_eq!(schema.version_store().get_version(&conn).unwrap(), 5);
    }

    #[test]
    fn test_steps_at_or_below_current_version_are_skipped() {
        let log = Log::default();
        let mut schema = Schema::new();
        schema
            .register(1, recorder(&log, "A"))
            .register(3, recorder(&log, "B"));

        let mut conn = db_at(2);
        let report = schema.install(&mut conn, 3).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["B"]);
        assert_eq!(report.applied, vec![1]);
        assert_eq!(report.previous_version, 2);
        assert_eq!(crate::get_version(&conn).unwrap(), 3);
    }

    #[test]
    fn test_action_receives_pre_run_version() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut schema: Schema = Schema::new();
        for min in [3, 4] {
            let seen = seen.clone();
            schema.register(min, move |version, _| {
                seen.lock().unwrap().push(version);
                Ok(())
            });
        }

        let mut conn = db_at(2);
        schema.install(&mut conn, 4).unwrap();

        // Both steps see the version from the start of the run, not a running count
        assert_eq!(*seen.lock().unwrap(), vec![2, 2]);
    }

    #[test]
    fn test_failing_step_stops_the_run() {
        let log = Log::default();
        let mut schema = Schema::new();
        schema
            .register(1, recorder(&log, "A"))
            .register(2, |_, _| Err(rusqlite::Error::InvalidQuery))
            .register(3, recorder(&log, "C"));

        let mut conn = Connection::open_in_memory().unwrap();
        let err = schema.install(&mut conn, 3).unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["A"]);
        assert_eq!(err.kind(), ErrorKind::StepFailed);
        assert!(matches!(
            err,
            InstallError::Step {
                index: 1,
                min_version: 2,
                ..
            }
        ));
        assert!(err.rollback_error().is_none());
        assert!(matches!(
            err.into_step_error(),
            Some(rusqlite::Error::InvalidQuery)
        ));
        assert_eq!(crate::get_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_rollback_failure_is_attached_to_step_error() {
        let mut schema = Schema::new();
        schema.register(1, |_, tx| {
            // Ends the transaction early, so the runner's own rollback fails
            tx.execute_batch("ROLLBACK")?;
            Err(rusqlite::Error::InvalidQuery)
        });

        let mut conn = Connection::open_in_memory().unwrap();
        let err = schema.install(&mut conn, 1).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StepFailed);
        assert!(err.rollback_error().is_some());
        assert!(matches!(
            err.into_step_error(),
            Some(rusqlite::Error::InvalidQuery)
        ));
        assert!(conn.is_autocommit());
        assert_eq!(crate::get_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_locked_reread_sees_latest_version() {
        let mut conn = db_at(4);
        let schema: Schema =
            Schema::with_config(InstallerConfig::default().with_lock(LockMode::Immediate));

        let tx = conn
            .transaction_with_behavior(LockMode::Immediate.behavior())
            .unwrap();
        tx.execute_batch("UPDATE version SET version = 6").unwrap();
        let (tx, version) = match schema.read_under_lock(tx) {
            Ok(read) => read,
            Err(err) => panic!("locked re-read failed: {:?}", err),
        };
        tx.commit().unwrap();

        assert_eq!(version, 6);
    }

    #[test]
    fn test_failed_locked_reread_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE version (v INTEGER)").unwrap();
        let schema: Schema =
            Schema::with_config(InstallerConfig::default().with_lock(LockMode::Immediate));

        let tx = conn
            .transaction_with_behavior(LockMode::Immediate.behavior())
            .unwrap();
        let err = match schema.read_under_lock(tx) {
            Ok(_) => panic!("re-read of a malformed version table succeeded"),
            Err(err) => err,
        };

        assert_eq!(err.kind(), ErrorKind::VersionRead);
        assert!(matches!(
            err,
            InstallError::Version(StoreError::VersionRead { .. })
        ));
        assert!(err.rollback_error().is_none());
        assert!(conn.is_autocommit(), "transaction should be rolled back");
    }

    #[test]
    fn test_duplicate_and_out_of_order_min_versions_are_accepted() {
        let log = Log::default();
        let mut schema = Schema::new();
        schema
            .register(2, recorder(&log, "first"))
            .register(2, recorder(&log, "second"))
            .register(1, recorder(&log, "third"));

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.pending(1), vec![0, 1]);
        assert_eq!(schema.pending(0), vec![0, 1, 2]);

        let mut conn = db_at(1);
        schema.install(&mut conn, 2).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_schema() {
        let schema: Schema = Schema::new();
        assert!(schema.is_empty());
        assert!(schema.pending(0).is_empty());

        let mut conn = Connection::open_in_memory().unwrap();
        let report = schema.install(&mut conn, 0).unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.version, 0);
    }

    #[test]
    fn test_step_debug_hides_action() {
        let mut schema: Schema = Schema::new();
        schema.register(7, |_, _| Ok(()));
        let rendered = format!("{:?}", schema.steps()[0]);
        assert!(rendered.contains("min_version: 7"));
    }
}
