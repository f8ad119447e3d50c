//! Options for opening a database.
//!
//! Configuration is an explicit value handed to [`Database::open`]; nothing is
//! read from process-wide state.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use docgraph::DatabaseConfig;
//!
//! let cfg = DatabaseConfig::default()
//!     .read_only(false)
//!     .lock_timeout(Duration::from_millis(250));
//! assert!(cfg.auto_create);
//! assert!(cfg.cascade_deletes);
//! ```
//!
//! [`Database::open`]: crate::Database::open

use std::time::Duration;

use serde::Deserialize;

use crate::errors::DocGraphError;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Create the database file when it does not exist.
    ///
    /// **Default:** `true`. When `false`, opening a missing file fails with `NotFound`.
    pub auto_create: bool,

    /// Reject every mutation and type declaration with `ReadOnly`.
    ///
    /// **Default:** `false`
    pub read_only: bool,

    /// Remove a vertex's edges when the vertex is deleted.
    ///
    /// **Default:** `true`. When `false`, committing the deletion of a vertex
    /// that still has edges fails with `InvalidArgument`.
    pub cascade_deletes: bool,

    /// Longest a commit waits for the writer lock before failing with `Timeout`.
    ///
    /// **Default:** 5 seconds
    #[serde(rename = "lock_timeout_ms", with = "millis")]
    pub lock_timeout: Duration,

    /// Parsed statements kept for reuse; `0` disables the cache.
    ///
    /// **Default:** `256`
    pub statement_cache_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            auto_create: true,
            read_only: false,
            cascade_deletes: true,
            lock_timeout: Duration::from_secs(5),
            statement_cache_capacity: 256,
        }
    }
}

impl DatabaseConfig {
    pub fn auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn cascade_deletes(mut self, cascade: bool) -> Self {
        self.cascade_deletes = cascade;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// ```rust
    /// use docgraph::DatabaseConfig;
    ///
    /// let cfg = DatabaseConfig::from_toml_str("read_only = true\nlock_timeout_ms = 100").unwrap();
    /// assert!(cfg.read_only);
    /// assert_eq!(cfg.lock_timeout.as_millis(), 100);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, DocGraphError> {
        toml::from_str(text).map_err(|e| DocGraphError::invalid_argument(format!("config: {e}")))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let cfg = DatabaseConfig::from_toml_str("cascade_deletes = false").expect("parse");
        assert!(!cfg.cascade_deletes);
        assert!(cfg.auto_create);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_toml_keys_are_rejected() {
        let err = DatabaseConfig::from_toml_str("autoCreate = true").expect_err("unknown key");
        assert!(matches!(err, DocGraphError::InvalidArgument(_)));
    }
}
