use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::sql::quote_ident;

/// Name of the primary-key column every table starts with.
pub const ID_COLUMN: &str = "id";

/// Type and constraint text of the implicit primary-key column.
pub const ID_DEFINITION: &str = "INTEGER PRIMARY KEY";

/// Describes a single column: its name followed by raw SQL type and
/// constraint tokens.
///
/// The tokens are emitted verbatim, space separated, after the quoted name:
/// `("age", ["INTEGER", "NOT NULL"])` renders as `"age" INTEGER NOT NULL`.
///
/// Serialized as a flat JSON array, e.g. `["name", "TEXT", "UNIQUE"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ColumnSpec {
    /// The column name.
    pub name: String,
    /// Raw type/constraint tokens, in declaration order.
    pub tokens: Vec<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, tokens: &[&str]) -> Self {
        Self {
            name: name.into(),
            tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    /// The `id INTEGER PRIMARY KEY` column.
    pub fn primary_key() -> Self {
        Self::new(ID_COLUMN, &[ID_DEFINITION])
    }

    pub fn is_id(&self) -> bool {
        self.name == ID_COLUMN
    }

    /// Column definition as it appears in `CREATE TABLE` / `ADD COLUMN`.
    pub fn definition(&self) -> String {
        let mut def = quote_ident(&self.name);
        for token in &self.tokens {
            def.push(' ');
            def.push_str(token);
        }
        def
    }
}

impl TryFrom<Vec<String>> for ColumnSpec {
    type Error = String;

    fn try_from(mut parts: Vec<String>) -> Result<Self, Self::Error> {
        if parts.is_empty() {
            return Err("column specification needs at least a name".into());
        }
        let name = parts.remove(0);
        Ok(Self {
            name,
            tokens: parts,
        })
    }
}

impl From<ColumnSpec> for Vec<String> {
    fn from(spec: ColumnSpec) -> Self {
        let mut parts = Vec::with_capacity(spec.tokens.len() + 1);
        parts.push(spec.name);
        parts.extend(spec.tokens);
        parts
    }
}

/// Validates a column list and makes sure it starts with the primary key.
///
/// If no `id` column is declared, `id INTEGER PRIMARY KEY` is prepended.
/// A declared `id` must come first and be `INTEGER PRIMARY KEY`. Empty and
/// duplicate column names are rejected.
pub fn normalize_columns(mut columns: Vec<ColumnSpec>) -> Result<Vec<ColumnSpec>, ModelError> {
    let mut seen = HashSet::new();
    for col in &columns {
        if col.name.trim().is_empty() {
            return Err(ModelError::InvalidSchema("Empty column name".into()));
        }
        if !seen.insert(col.name.as_str()) {
            return Err(ModelError::InvalidSchema(format!(
                "Duplicate column name: {}",
                col.name
            )));
        }
    }

    match columns.iter().position(ColumnSpec::is_id) {
        Some(0) if is_rowid_alias(&columns[0]) => {}
        Some(0) => {
            return Err(ModelError::InvalidSchema(format!(
                "'{}' must be declared {}, got '{}'",
                ID_COLUMN,
                ID_DEFINITION,
                columns[0].tokens.join(" ")
            )));
        }
        Some(pos) => {
            return Err(ModelError::InvalidSchema(format!(
                "'{}' must be the first column, found at position {}",
                ID_COLUMN, pos
            )));
        }
        None => columns.insert(0, ColumnSpec::primary_key()),
    }

    Ok(columns)
}

/// Whether the column's tokens make it SQLite's rowid alias: exactly
/// `INTEGER` as the type, followed by `PRIMARY KEY`.
fn is_rowid_alias(col: &ColumnSpec) -> bool {
    let words: Vec<String> = col
        .tokens
        .iter()
        .flat_map(|t| t.split_whitespace())
        .map(str::to_ascii_uppercase)
        .collect();
    words.len() >= 3 && words[0] == "INTEGER" && words[1] == "PRIMARY" && words[2] == "KEY"
}

/// Parses a schema description given as a JSON array of arrays.
///
/// ```
/// let cols = sqlmodel::schema_from_json(r#"[["name", "TEXT", "UNIQUE"]]"#).unwrap();
/// assert_eq!(cols[0].name, "id");
/// assert_eq!(cols[1].definition(), "\"name\" TEXT UNIQUE");
/// ```
pub fn schema_from_json(json: &str) -> Result<Vec<ColumnSpec>, ModelError> {
    let columns: Vec<ColumnSpec> = serde_json::from_str(json)?;
    normalize_columns(columns)
}

/// Column names in declaration order.
pub fn column_names(columns: &[ColumnSpec]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_primary_key_when_missing() {
        let cols = normalize_columns(vec![ColumnSpec::new("name", &["TEXT"])]).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0], ColumnSpec::primary_key());
        assert_eq!(cols[1].name, "name");
    }

    #[test]
    fn keeps_declared_primary_key() {
        let cols = normalize_columns(vec![
            ColumnSpec::new("id", &["INTEGER", "PRIMARY KEY"]),
            ColumnSpec::new("age", &["INTEGER"]),
        ])
        .unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].tokens, vec!["INTEGER", "PRIMARY KEY"]);
    }

    #[test]
    fn rejects_misplaced_id() {
        let err = normalize_columns(vec![
            ColumnSpec::new("name", &["TEXT"]),
            ColumnSpec::primary_key(),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidSchema(_)));
    }

    #[test]
    fn rejects_id_that_is_not_integer_primary_key() {
        let cases: [&[&str]; 4] = [&["TEXT"], &["INTEGER"], &["TEXT", "PRIMARY KEY"], &[]];
        for tokens in cases {
            let err = normalize_columns(vec![
                ColumnSpec::new("id", tokens),
                ColumnSpec::new("name", &["TEXT"]),
            ])
            .unwrap_err();
            assert!(matches!(err, ModelError::InvalidSchema(_)), "{:?}", tokens);
        }

        let spaced = normalize_columns(vec![ColumnSpec::new("id", &["integer primary  key"])]);
        assert!(spaced.is_ok());
        let autoinc = normalize_columns(vec![ColumnSpec::new(
            "id",
            &["INTEGER", "PRIMARY KEY", "AUTOINCREMENT"],
        )]);
        assert!(autoinc.is_ok());
    }

    #[test]
    fn rejects_duplicates_and_blank_names() {
        let dup = normalize_columns(vec![
            ColumnSpec::new("a", &["TEXT"]),
            ColumnSpec::new("a", &["INTEGER"]),
        ]);
        assert!(dup.unwrap_err().to_string().contains("Duplicate column name"));

        let blank = normalize_columns(vec![ColumnSpec::new(" ", &["TEXT"])]);
        assert!(blank.is_err());
    }

    #[test]
    fn definition_joins_tokens() {
        let col = ColumnSpec::new("age", &["INTEGER", "NOT NULL"]);
        assert_eq!(col.definition(), "\"age\" INTEGER NOT NULL");
        assert_eq!(ColumnSpec::new("free", &[]).definition(), "\"free\"");
    }

    #[test]
    fn json_array_form() {
        let cols = schema_from_json(
            r#"[["id", "INTEGER PRIMARY KEY"], ["age", "INTEGER", "NOT NULL"]]"#,
        )
        .unwrap();
        assert_eq!(cols[1], ColumnSpec::new("age", &["INTEGER", "NOT NULL"]));

        let back = serde_json::to_string(&cols[1]).unwrap();
        assert_eq!(back, r#"["age","INTEGER","NOT NULL"]"#);

        assert!(schema_from_json("[[]]").is_err());
    }
}
