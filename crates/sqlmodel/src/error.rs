use thiserror::Error;

/// Errors that can occur during table and record operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An error originating from the underlying SQLite database.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The provided schema is invalid (e.g., empty column name, duplicate names).
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The requested table does not exist in the store.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A column name was used that the table's schema does not declare.
    #[error("Unknown column '{column}' for table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A positional row does not have the width its column list requires.
    #[error("Row {row} has {got} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    /// Field or filter input was not a JSON object, or was empty where
    /// at least one field is required.
    #[error("Invalid fields: {0}")]
    InvalidFields(String),

    /// A delete was requested with no usable filter keys.
    #[error("Refusing to delete from '{0}' without a filter (use delete_all)")]
    EmptyFilter(String),

    /// A record operation needs an `id` field the record does not carry.
    #[error("Record has no id field")]
    MissingId,

    /// The in-memory column list diverges from the persisted schema.
    #[error("Schema mismatch for '{table}': local {local:?}, stored {stored:?}")]
    SchemaMismatch {
        table: String,
        local: Vec<String>,
        stored: Vec<String>,
    },

    /// An error occurred during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
