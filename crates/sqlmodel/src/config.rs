//! Configuration loaded from environment variables.
//!
//! Every setting has a default; override any variable at process startup.
//!
//! | Variable                   | Default   | Description                                   |
//! |----------------------------|-----------|-----------------------------------------------|
//! | `SQLMODEL_DB_PATH`         | `sql.db`  | SQLite store file                             |
//! | `SQLMODEL_FAILURE_POLICY`  | `lenient` | `lenient` swallows store errors, `strict` returns them |
//! | `SQLMODEL_UNKNOWN_KEYS`    | `drop`    | filter keys outside the schema: `drop` or `reject` |
//! | `SQLMODEL_TRACK_CHANGES`   | `false`   | `Record::save` only pushes modified fields    |
//! | `SQLMODEL_BUSY_TIMEOUT_MS` | `5000`    | SQLite busy timeout for each connection       |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ModelError;
use crate::store::SqliteStore;

/// What happens when the store rejects a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and return normally. Writes report it in
    /// [`ExecOutcome::error`](crate::ExecOutcome), reads return no rows.
    #[default]
    Lenient,
    /// Return the store error to the caller.
    Strict,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Handling of filter keys that the table schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    /// Ignore the key; only declared columns take part in the filter.
    #[default]
    Drop,
    /// Fail with [`ModelError::UnknownColumn`].
    Reject,
}

impl FromStr for UnknownKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown key policy: {other}")),
        }
    }
}

/// Behavioural switches carried by every [`Table`](crate::Table) and the
/// records it produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub failure_policy: FailurePolicy,
    pub unknown_keys: UnknownKeyPolicy,
    /// When set, `Record::save` skips fields equal to their loaded value.
    pub track_changes: bool,
}

impl TableOptions {
    pub fn strict() -> Self {
        Self {
            failure_policy: FailurePolicy::Strict,
            ..Self::default()
        }
    }
}

/// Runtime configuration for opening a store and building tables.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Path of the SQLite database file.
    pub db_path: String,

    pub failure_policy: FailurePolicy,

    pub unknown_keys: UnknownKeyPolicy,

    pub track_changes: bool,

    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            db_path: "sql.db".to_string(),
            failure_policy: FailurePolicy::default(),
            unknown_keys: UnknownKeyPolicy::default(),
            track_changes: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl ModelConfig {
    /// Load configuration from environment variables, applying defaults where
    /// a variable is absent or unparseable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            db_path:         env_str("SQLMODEL_DB_PATH", &d.db_path),
            failure_policy:  env_parse("SQLMODEL_FAILURE_POLICY", d.failure_policy),
            unknown_keys:    env_parse("SQLMODEL_UNKNOWN_KEYS", d.unknown_keys),
            track_changes:   env_bool("SQLMODEL_TRACK_CHANGES"),
            busy_timeout_ms: env_parse("SQLMODEL_BUSY_TIMEOUT_MS", d.busy_timeout_ms),
        }
    }

    pub fn table_options(&self) -> TableOptions {
        TableOptions {
            failure_policy: self.failure_policy,
            unknown_keys: self.unknown_keys,
            track_changes: self.track_changes,
        }
    }

    /// Opens the configured store.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>, ModelError> {
        let store = SqliteStore::open(&self.db_path)?
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms));
        Ok(Arc::new(store))
    }
}

fn env_bool(key: &str) -> bool {
    std::env::var(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.db_path, "sql.db");
        assert_eq!(cfg.failure_policy, FailurePolicy::Lenient);
        assert_eq!(cfg.unknown_keys, UnknownKeyPolicy::Drop);
        assert!(!cfg.track_changes);
        assert!(cfg.busy_timeout_ms > 0);
    }

    #[test]
    fn env_override_applied() {
        std::env::set_var("SQLMODEL_BUSY_TIMEOUT_MS", "250");
        std::env::set_var("SQLMODEL_UNKNOWN_KEYS", "Reject");
        let cfg = ModelConfig::from_env();
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert_eq!(cfg.unknown_keys, UnknownKeyPolicy::Reject);
        std::env::remove_var("SQLMODEL_BUSY_TIMEOUT_MS");
        std::env::remove_var("SQLMODEL_UNKNOWN_KEYS");
    }

    #[test]
    fn unparseable_values_fall_back() {
        assert!("bogus".parse::<FailurePolicy>().is_err());
        assert_eq!(env_parse("SQLMODEL_TEST_UNSET_VAR", FailurePolicy::Strict), FailurePolicy::Strict);
    }

    #[test]
    fn options_follow_config() {
        let cfg = ModelConfig {
            failure_policy: FailurePolicy::Strict,
            track_changes: true,
            ..ModelConfig::default()
        };
        let opts = cfg.table_options();
        assert_eq!(opts.failure_policy, FailurePolicy::Strict);
        assert!(opts.track_changes);
        assert_eq!(opts.unknown_keys, UnknownKeyPolicy::Drop);
    }
}
