use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ModelError;
use crate::value::{sql_to_json, SqlParam};

/// One result row, positionally ordered like the statement's columns.
pub type Row = Vec<Value>;

/// Result of a mutating statement.
///
/// Under [`FailurePolicy::Lenient`](crate::FailurePolicy::Lenient) a failed
/// statement still yields an outcome; `error` then carries the store's
/// message and `affected` is zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows changed by the statement (or summed over a batch).
    pub affected: usize,
    /// Rowid of the last row inserted, if the statement inserted one.
    pub last_insert_id: Option<i64>,
    /// Failure message of a swallowed store error.
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn ok(affected: usize) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Folds another outcome into this one. Row counts add up, the latest
    /// insert id wins, and the first error is kept.
    pub fn merge(&mut self, other: ExecOutcome) {
        self.affected += other.affected;
        if other.last_insert_id.is_some() {
            self.last_insert_id = other.last_insert_id;
        }
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Capability to run statements against a relational store.
///
/// Implementations acquire a connection per call and release it before
/// returning; every call is its own transaction.
pub trait StoreClient: fmt::Debug + Send + Sync {
    /// Human-readable location of the store, for logs.
    fn location(&self) -> String;

    /// Runs a statement that yields rows.
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, ModelError>;

    /// Runs a mutating statement and commits it.
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<ExecOutcome, ModelError>;

    /// Runs one statement once per parameter row inside a single transaction.
    /// Either every row is committed or none is.
    fn execute_many(&self, sql: &str, rows: &[Vec<SqlParam>]) -> Result<ExecOutcome, ModelError>;
}

/// A store backed by a SQLite database file.
///
/// No connection is kept between calls: each operation opens the file, runs
/// inside a transaction, commits, and closes. A failed statement rolls back
/// when its transaction is dropped.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Points at (and creates, if needed) the SQLite database at `path`.
    ///
    /// A probe connection is opened and closed immediately so that an
    /// unusable path is reported here rather than on first use.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        };
        drop(store.connect()?);
        debug!("Opened SqliteStore at {}", store.path.display());
        Ok(store)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, ModelError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }
}

impl StoreClient for SqliteStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, ModelError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut rows = Vec::new();
        {
            let mut stmt = tx.prepare(sql)?;
            let col_count = stmt.column_count();
            let mapped = stmt.query_map(params_from_iter(params.iter()), |row| {
                (0..col_count)
                    .map(|i| row.get_ref(i).map(sql_to_json))
                    .collect::<Result<Row, _>>()
            })?;
            for row_result in mapped {
                rows.push(row_result?);
            }
        }
        debug!(rows = rows.len(), "query returned");
        tx.commit()?;
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<ExecOutcome, ModelError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(sql, params_from_iter(params.iter()))?;
        let rowid = tx.last_insert_rowid();
        tx.commit()?;
        Ok(ExecOutcome {
            affected,
            last_insert_id: (rowid != 0).then_some(rowid),
            error: None,
        })
    }

    fn execute_many(&self, sql: &str, rows: &[Vec<SqlParam>]) -> Result<ExecOutcome, ModelError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                affected += stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        let rowid = tx.last_insert_rowid();
        tx.commit()?;
        Ok(ExecOutcome {
            affected,
            last_insert_id: (rowid != 0).then_some(rowid),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value as SqlValue;

    #[test]
    fn merge_keeps_first_error() {
        let mut total = ExecOutcome::ok(1);
        total.merge(ExecOutcome::failed("boom"));
        total.merge(ExecOutcome::failed("later"));
        total.merge(ExecOutcome::ok(2));
        assert_eq!(total.affected, 3);
        assert_eq!(total.error.as_deref(), Some("boom"));
        assert!(!total.is_ok());
    }

    #[test]
    fn open_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("x.db");
        assert!(SqliteStore::open(&path).is_err());
    }

    #[test]
    fn failed_statement_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("t.db")).unwrap();
        store
            .execute("CREATE TABLE t (v INTEGER NOT NULL)", &[])
            .unwrap();

        let rows = vec![
            vec![SqlValue::Integer(1).into()],
            vec![SqlValue::Null.into()],
        ];
        assert!(store.execute_many("INSERT INTO t (v) VALUES (?)", &rows).is_err());

        let left = store.query("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(left[0][0], 0);
    }
}
