//! Installer configuration
//!
//! [`InstallerConfig`] controls where the schema version is stored and how an
//! install run coordinates with other installers. It can be built in code or
//! parsed from TOML:
//!
//! ```toml
//! version_table = "schema_version"
//! lock = "immediate"
//! verify_row_count = true
//! busy_timeout_ms = 5000
//! ```

use std::fmt;

use rusqlite::TransactionBehavior;
use serde::Deserialize;

use crate::errors::ConfigError;

/// Default name of the version-tracking table
pub const DEFAULT_VERSION_TABLE: &str = "version";

/// Name of the version-tracking table
///
/// The name is interpolated into SQL, so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct VersionTable(String);

impl VersionTable {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(ConfigError::InvalidTableName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for use in SQL text
    pub(crate) fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self(DEFAULT_VERSION_TABLE.to_string())
    }
}

impl TryFrom<String> for VersionTable {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for VersionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// How the migration transaction is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Plain `BEGIN`: concurrent installers are not coordinated
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE`: take the write lock up front and re-read the
    /// version under it, so concurrent installers run one after another
    Immediate,
}

impl LockMode {
    pub(crate) fn behavior(self) -> TransactionBehavior {
        match self {
            LockMode::Deferred => TransactionBehavior::Deferred,
            LockMode::Immediate => TransactionBehavior::Immediate,
        }
    }
}

/// Configuration for a [`Schema`](crate::Schema) and its version store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    pub version_table: VersionTable,
    pub lock: LockMode,
    /// Require the version update to touch exactly one row
    pub verify_row_count: bool,
    /// SQLite busy timeout applied by [`db::configure`](crate::db::configure)
    pub busy_timeout_ms: Option<u64>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            version_table: VersionTable::default(),
            lock: LockMode::default(),
            verify_row_count: true,
            busy_timeout_ms: None,
        }
    }
}

impl InstallerConfig {
    /// Parse a configuration from TOML text
    ///
    /// Missing keys take their default values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_version_table(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        self.version_table = VersionTable::new(name)?;
        Ok(self)
    }

    pub fn with_lock(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_verify_row_count(mut self, verify: bool) -> Self {
        self.verify_row_count = verify;
        self
    }

    pub fn with_busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = Some(millis);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.version_table.as_str(), "version");
        assert_eq!(config.lock, LockMode::Deferred);
        assert!(config.verify_row_count);
        assert_eq!(config.busy_timeout_ms, None);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = InstallerConfig::from_toml_str("").unwrap();
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let config = InstallerConfig::from_toml_str(
            r#"
            version_table = "schema_version"
            lock = "immediate"
            verify_row_count = false
            busy_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.version_table.as_str(), "schema_version");
        assert_eq!(config.lock, LockMode::Immediate);
        assert!(!config.verify_row_count);
        assert_eq!(config.busy_timeout_ms, Some(250));
    }

    #[test]
    fn test_toml_rejects_bad_table_name() {
        let err = InstallerConfig::from_toml_str(r#"version_table = "version; DROP TABLE x""#)
            .unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG");
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        assert!(InstallerConfig::from_toml_str("lock_timeout = 3").is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(VersionTable::new("version").is_ok());
        assert!(VersionTable::new("_v2").is_ok());
        assert!(VersionTable::new("").is_err());
        assert!(VersionTable::new("2fast").is_err());
        assert!(VersionTable::new("has space").is_err());
        assert!(VersionTable::new("quote\"d").is_err());
    }

    #[test]
    fn test_quoted() {
        let table = VersionTable::new("schema_version").unwrap();
        assert_eq!(table.quoted(), "\"schema_version\"");
        assert_eq!(table.to_string(), "schema_version");
    }

    #[test]
    fn test_builder() {
        let config = InstallerConfig::default()
            .with_version_table("meta_version")
            .unwrap()
            .with_lock(LockMode::Immediate)
            .with_verify_row_count(false)
            .with_busy_timeout_ms(100);

        assert_eq!(config.version_table.as_str(), "meta_version");
        assert!(matches!(
            config.lock.behavior(),
            TransactionBehavior::Immediate
        ));
        assert!(!config.verify_row_count);
        assert_eq!(config.busy_timeout_ms, Some(100));
    }
}
