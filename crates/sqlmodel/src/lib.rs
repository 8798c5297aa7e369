//! # sqlmodel
//!
//! A small table/record mapping layer over a single-file SQLite store.
//!
//! A [`Table`] pairs a table name with an ordered list of [`ColumnSpec`]s and
//! turns high-level calls (create, insert, filter, update, delete, alter) into
//! SQL. Reads return [`Record`]s: mutable rows that remember their table and
//! can [`save`](Record::save) or [`remove`](Record::remove) themselves.
//!
//! Nothing holds a connection. Each operation opens the database file, runs
//! one statement (or one batch) in a transaction, commits, and closes.
//!
//! ## Failure policy
//!
//! With [`FailurePolicy::Lenient`] (the default) a statement rejected by the
//! store is logged and swallowed: writes return an [`ExecOutcome`] carrying
//! the error, reads return no rows. [`FailurePolicy::Strict`] returns the
//! error instead. Validation at the API boundary (unknown columns, row width,
//! malformed schema) always returns an error.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlmodel::{ColumnSpec, OrderBy, SqliteStore, Table};
//!
//! let store = Arc::new(SqliteStore::open("people.db").unwrap());
//! let mut people = Table::new(
//!     store,
//!     "people",
//!     vec![
//!         ColumnSpec::new("name", &["TEXT", "UNIQUE"]),
//!         ColumnSpec::new("age", &["INTEGER", "NOT NULL"]),
//!     ],
//! )
//! .unwrap();
//!
//! people.create().unwrap();
//! people.add(&json!({"name": "Ada", "age": 30})).unwrap();
//!
//! let mut ada = people.all(&OrderBy::default()).unwrap().remove(0);
//! ada.set("age", 31).unwrap();
//! ada.save().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod sql;
pub mod store;
pub mod table;
pub mod value;

// Re-exports for convenience.
pub use config::{FailurePolicy, ModelConfig, TableOptions, UnknownKeyPolicy};
pub use error::ModelError;
pub use record::Record;
pub use schema::{normalize_columns, schema_from_json, ColumnSpec, ID_COLUMN};
pub use sql::OrderBy;
pub use store::{ExecOutcome, Row, SqliteStore, StoreClient};
pub use table::Table;
pub use value::{blob, SqlParam};
