//! SQL text builders.
//!
//! Everything here is pure string construction; execution lives in
//! [`crate::store`]. Identifiers are double-quoted, values are `?`
//! placeholders except where noted.

use crate::schema::ColumnSpec;

/// Quotes an identifier, doubling any embedded double quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Ordering applied to `SELECT` reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    fn clause(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!(" ORDER BY {} {}", quote_ident(&self.column), dir)
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::asc(crate::schema::ID_COLUMN)
    }
}

pub fn create_table(table: &str, columns: &[ColumnSpec]) -> String {
    let defs: Vec<String> = columns.iter().map(ColumnSpec::definition).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        defs.join(", ")
    )
}

pub fn insert<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c.as_ref())).collect();
    let placeholders = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// `col1 = ? AND col2 = ?` for a conjunctive equality filter.
pub fn where_equal<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c.as_ref())))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select<S: AsRef<str>>(
    table: &str,
    projection: Option<&[S]>,
    filter: &[S],
    order: Option<&OrderBy>,
) -> String {
    let cols = match projection {
        Some(cols) => cols
            .iter()
            .map(|c| quote_ident(c.as_ref()))
            .collect::<Vec<_>>()
            .join(", "),
        None => "*".to_string(),
    };
    let mut sql = format!("SELECT {} FROM {}", cols, quote_ident(table));
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_equal(filter));
    }
    if let Some(order) = order {
        sql.push_str(&order.clause());
    }
    sql
}

/// Raw update: `value_literal` and `condition` are interpolated as given.
pub fn update_raw(table: &str, column: &str, value_literal: &str, condition: Option<&str>) -> String {
    let mut sql = format!(
        "UPDATE {} SET {} = {}",
        quote_ident(table),
        quote_ident(column),
        value_literal
    );
    if let Some(cond) = condition {
        sql.push_str(" WHERE ");
        sql.push_str(cond);
    }
    sql
}

pub fn delete<S: AsRef<str>>(table: &str, filter: &[S]) -> String {
    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_equal(filter));
    }
    sql
}

pub fn add_column(table: &str, column: &ColumnSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table),
        column.definition()
    )
}

pub fn drop_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn rename_column(table: &str, old: &str, new: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_ident(table),
        quote_ident(old),
        quote_ident(new)
    )
}

pub fn rename_table(old: &str, new: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(old),
        quote_ident(new)
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote_ident(table))
}

pub fn table_info(table: &str) -> String {
    format!("PRAGMA table_info({})", quote_ident(table))
}

pub fn count(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

pub const LIST_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name";
