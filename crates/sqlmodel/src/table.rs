use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::{FailurePolicy, TableOptions, UnknownKeyPolicy};
use crate::error::ModelError;
use crate::record::Record;
use crate::schema::{column_names, normalize_columns, ColumnSpec, ID_COLUMN};
use crate::sql::{self, OrderBy};
use crate::store::{ExecOutcome, Row, StoreClient};
use crate::value::{json_to_sql, sql_literal, SqlParam};

/// A table in the store: a name, an ordered column list, and the operations
/// that translate into SQL against it.
///
/// `Table` holds no connection. Every operation goes through the injected
/// [`StoreClient`], which opens and closes its own connection per call.
///
/// Alter operations (`add_fields`, `remove_fields`, `rename_field`) change the
/// store only. Mirror them with [`Table::set_columns`] or call
/// [`Table::resync`] to reload the persisted schema.
#[derive(Debug, Clone)]
pub struct Table {
    store: Arc<dyn StoreClient>,
    name: String,
    columns: Vec<ColumnSpec>,
    options: TableOptions,
}

/// Filter columns that survived the unknown-key policy, with their bound
/// values.
struct FilterPlan {
    columns: Vec<String>,
    params: Vec<SqlParam>,
    dropped: usize,
}

impl FilterPlan {
    /// True when the caller supplied keys but none of them is declared.
    fn matches_nothing(&self) -> bool {
        self.columns.is_empty() && self.dropped > 0
    }
}

impl Table {
    /// Builds a table with an explicit schema. The column list is validated
    /// and gets `id INTEGER PRIMARY KEY` prepended when no `id` is declared.
    pub fn new(
        store: Arc<dyn StoreClient>,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            store,
            name: name.into(),
            columns: normalize_columns(columns)?,
            options: TableOptions::default(),
        })
    }

    /// Builds a table from the schema persisted in the store.
    ///
    /// Column order, declared types, NOT NULL, DEFAULT and PRIMARY KEY are
    /// recovered from `PRAGMA table_info`; UNIQUE and CHECK constraints are
    /// not. Returns [`ModelError::TableNotFound`] if the table has no columns.
    pub fn discover(store: Arc<dyn StoreClient>, name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        let columns = read_table_info(store.as_ref(), &name)?;
        if columns.is_empty() {
            return Err(ModelError::TableNotFound(name));
        }
        Ok(Self {
            store,
            name,
            columns,
            options: TableOptions::default(),
        })
    }

    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.columns)
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Replaces the in-memory column list, e.g. after an alter.
    pub fn set_columns(&mut self, columns: Vec<ColumnSpec>) -> Result<(), ModelError> {
        self.columns = normalize_columns(columns)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schema lifecycle
    // -----------------------------------------------------------------------

    /// Creates the table if it does not already exist.
    ///
    /// Idempotent by name; an existing table is left untouched even if its
    /// columns differ.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn create(&mut self) -> Result<ExecOutcome, ModelError> {
        self.columns = normalize_columns(self.columns.clone())?;
        let outcome = self.exec(&sql::create_table(&self.name, &self.columns), &[])?;
        if outcome.is_ok() {
            info!(columns = self.columns.len(), "table ensured");
        }
        Ok(outcome)
    }

    /// Adds columns, one `ALTER TABLE ... ADD COLUMN` per spec.
    ///
    /// Statements run in order on separate connections. A failure partway
    /// leaves the earlier columns added.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn add_fields(&self, fields: &[ColumnSpec]) -> Result<ExecOutcome, ModelError> {
        if let Some(id) = fields.iter().find(|f| f.is_id()) {
            return Err(ModelError::InvalidSchema(format!(
                "cannot add primary key column '{}'",
                id.name
            )));
        }
        let mut outcome = ExecOutcome::default();
        for field in fields {
            let step = self.exec(&sql::add_column(&self.name, field), &[])?;
            if step.is_ok() {
                info!(column = %field.name, "column added");
            }
            outcome.merge(step);
        }
        Ok(outcome)
    }

    /// Drops columns, one `ALTER TABLE ... DROP COLUMN` per name.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn remove_fields(&self, names: &[&str]) -> Result<ExecOutcome, ModelError> {
        if names.contains(&ID_COLUMN) {
            return Err(ModelError::InvalidSchema(format!(
                "cannot drop primary key column '{}'",
                ID_COLUMN
            )));
        }
        let mut outcome = ExecOutcome::default();
        for name in names {
            let step = self.exec(&sql::drop_column(&self.name, name), &[])?;
            if step.is_ok() {
                info!(column = %name, "column dropped");
            }
            outcome.merge(step);
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(table = %self.name))]
    pub fn rename_field(&self, old: &str, new: &str) -> Result<ExecOutcome, ModelError> {
        let outcome = self.exec(&sql::rename_column(&self.name, old, new), &[])?;
        if outcome.is_ok() {
            info!(from = %old, to = %new, "column renamed");
        }
        Ok(outcome)
    }

    /// Renames any table in the store. This handle keeps its own name.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn rename_table(&self, old: &str, new: &str) -> Result<ExecOutcome, ModelError> {
        let outcome = self.exec(&sql::rename_table(old, new), &[])?;
        if outcome.is_ok() {
            info!(from = %old, to = %new, "table renamed");
        }
        Ok(outcome)
    }

    /// Drops any table in the store by name.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn delete_table(&self, name: &str) -> Result<ExecOutcome, ModelError> {
        let outcome = self.exec(&sql::drop_table(name), &[])?;
        if outcome.is_ok() {
            info!(dropped = %name, "table dropped");
        }
        Ok(outcome)
    }

    /// Ordered column names persisted for this table, or for `table` when
    /// given. Empty if the table does not exist.
    pub fn get_tables_meta(&self, table: Option<&str>) -> Result<Vec<String>, ModelError> {
        let table = table.unwrap_or(&self.name);
        let rows = self.query(&sql::table_info(table), &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(1).and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    /// Names of all user tables in the store.
    pub fn get_tables(&self) -> Result<Vec<String>, ModelError> {
        let rows = self.query(sql::LIST_TABLES, &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    /// Reloads the column list from the store.
    pub fn resync(&mut self) -> Result<(), ModelError> {
        let columns = read_table_info(self.store.as_ref(), &self.name)?;
        if columns.is_empty() {
            return Err(ModelError::TableNotFound(self.name.clone()));
        }
        debug!(table = %self.name, columns = columns.len(), "schema resynced");
        self.columns = columns;
        Ok(())
    }

    /// Fails with [`ModelError::SchemaMismatch`] when the persisted column
    /// names differ from the in-memory list.
    pub fn verify_schema(&self) -> Result<(), ModelError> {
        let stored = self.get_tables_meta(None)?;
        let local = self.column_names();
        if stored != local {
            return Err(ModelError::SchemaMismatch {
                table: self.name.clone(),
                local,
                stored,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Inserts one row. `fields` must be a JSON object whose keys are all
    /// declared columns.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn add(&self, fields: &Value) -> Result<ExecOutcome, ModelError> {
        let obj = as_object(fields)?;
        if obj.is_empty() {
            return Err(ModelError::InvalidFields(
                "row must have at least one field".into(),
            ));
        }

        let mut columns = Vec::with_capacity(obj.len());
        let mut params = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            self.require_column(key)?;
            columns.push(key.as_str());
            params.push(json_to_sql(val));
        }

        let outcome = self.exec(&sql::insert(&self.name, &columns), &params)?;
        debug!(rowid = ?outcome.last_insert_id, "inserted row");
        Ok(outcome)
    }

    /// Inserts many rows in one transaction.
    ///
    /// Each row supplies one value per declared column except `id`, in
    /// declared order. Widths are checked before anything reaches the store.
    #[instrument(skip_all, fields(table = %self.name, rows = rows.len()))]
    pub fn add_many(&self, rows: &[Vec<Value>]) -> Result<ExecOutcome, ModelError> {
        let columns: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !c.is_id())
            .map(|c| c.name.as_str())
            .collect();

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ModelError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
        }
        if rows.is_empty() {
            return Ok(ExecOutcome::ok(0));
        }

        let params: Vec<Vec<SqlParam>> = rows
            .iter()
            .map(|row| row.iter().map(json_to_sql).collect())
            .collect();
        let sql = sql::insert(&self.name, &columns);
        debug!(sql = %sql, "executing batch");
        match self.store.execute_many(&sql, &params) {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.absorb(e).map(ExecOutcome::failed),
        }
    }

    /// Sets `column` to `value` on every row matching the raw SQL
    /// `condition` (or on all rows when `None`).
    ///
    /// Nothing on this path is bound as a parameter: the value is rendered as
    /// an SQL literal and the condition is interpolated verbatim.
    #[instrument(skip_all, fields(table = %self.name, column = %column))]
    pub fn update(
        &self,
        column: &str,
        value: &Value,
        condition: Option<&str>,
    ) -> Result<ExecOutcome, ModelError> {
        self.require_column(column)?;
        let sql = sql::update_raw(&self.name, column, &sql_literal(value), condition);
        self.exec(&sql, &[])
    }

    /// Deletes every row.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn delete_all(&self) -> Result<ExecOutcome, ModelError> {
        self.exec(&sql::delete::<&str>(&self.name, &[]), &[])
    }

    /// Deletes rows matching a conjunctive equality filter.
    ///
    /// An empty filter is refused; use [`Table::delete_all`]. When every
    /// supplied key is dropped by the unknown-key policy nothing is deleted.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn remove(&self, filter: &Value) -> Result<ExecOutcome, ModelError> {
        let plan = self.plan_filter(filter)?;
        if plan.matches_nothing() {
            debug!(dropped = plan.dropped, "no declared filter keys; nothing removed");
            return Ok(ExecOutcome::ok(0));
        }
        if plan.columns.is_empty() {
            return Err(ModelError::EmptyFilter(self.name.clone()));
        }
        let outcome = self.exec(&sql::delete(&self.name, &plan.columns), &plan.params)?;
        debug!(removed = outcome.affected, "removed rows");
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every row, ordered.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn all(&self, order: &OrderBy) -> Result<Vec<Record>, ModelError> {
        self.select_records(&[], &[], order)
    }

    /// Rows where every declared key of `filter` equals its value.
    ///
    /// Undeclared keys follow [`UnknownKeyPolicy`]. An empty filter returns
    /// every row; a filter whose keys were all dropped returns none.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn get(&self, filter: &Value, order: &OrderBy) -> Result<Vec<Record>, ModelError> {
        let plan = self.plan_filter(filter)?;
        if plan.matches_nothing() {
            debug!(dropped = plan.dropped, "no declared filter keys; empty result");
            return Ok(Vec::new());
        }
        self.select_records(&plan.columns, &plan.params, order)
    }

    /// Projection read. `cols` is a comma-separated column list; the returned
    /// records carry exactly those fields, in that order.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn get_by_column(&self, cols: &str) -> Result<Vec<Record>, ModelError> {
        let projection: Vec<String> = cols
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if projection.is_empty() {
            return Err(ModelError::InvalidFields("no columns requested".into()));
        }
        for col in &projection {
            self.require_column(col)?;
        }

        let rows = self.query(&sql::select(&self.name, Some(projection.as_slice()), &[], None), &[])?;
        self.to_records(&projection, rows)
    }

    /// Number of rows in the table.
    pub fn count(&self) -> Result<usize, ModelError> {
        let rows = self.query(&sql::count(&self.name), &[])?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    /// Runs caller-written SQL as a mutation, under this table's failure
    /// policy. `params` bind positionally to `?` placeholders.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome, ModelError> {
        let params: Vec<SqlParam> = params.iter().map(json_to_sql).collect();
        self.exec(sql, &params)
    }

    /// Runs caller-written SQL that yields rows, under this table's failure
    /// policy. Rows come back raw, in the statement's column order.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn query_sql(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ModelError> {
        let params: Vec<SqlParam> = params.iter().map(json_to_sql).collect();
        self.query(sql, &params)
    }

    /// Whether a row with this id exists.
    pub(crate) fn exists(&self, id: &Value) -> Result<bool, ModelError> {
        let sql = sql::select(&self.name, Some(&[ID_COLUMN][..]), &[ID_COLUMN], None);
        let rows = self.query(&sql, &[json_to_sql(id)])?;
        Ok(!rows.is_empty())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn select_records(
        &self,
        filter: &[String],
        params: &[SqlParam],
        order: &OrderBy,
    ) -> Result<Vec<Record>, ModelError> {
        self.require_column(&order.column)?;
        let sql = sql::select::<String>(&self.name, None, filter, Some(order));
        let rows = self.query(&sql, params)?;
        self.to_records(&self.column_names(), rows)
    }

    fn to_records(&self, columns: &[String], rows: Vec<Row>) -> Result<Vec<Record>, ModelError> {
        debug!(rows = rows.len(), "materializing records");
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| Record::from_row(self.clone(), columns.to_vec(), row, i))
            .collect()
    }

    fn plan_filter(&self, filter: &Value) -> Result<FilterPlan, ModelError> {
        let obj = as_object(filter)?;
        let mut plan = FilterPlan {
            columns: Vec::with_capacity(obj.len()),
            params: Vec::with_capacity(obj.len()),
            dropped: 0,
        };
        for (key, val) in obj {
            if self.has_column(key) {
                plan.columns.push(key.clone());
                plan.params.push(json_to_sql(val));
                continue;
            }
            match self.options.unknown_keys {
                UnknownKeyPolicy::Drop => {
                    debug!(key = %key, "dropping undeclared filter key");
                    plan.dropped += 1;
                }
                UnknownKeyPolicy::Reject => return Err(self.unknown(key)),
            }
        }
        Ok(plan)
    }

    fn require_column(&self, name: &str) -> Result<(), ModelError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(self.unknown(name))
        }
    }

    fn unknown(&self, column: &str) -> ModelError {
        ModelError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        }
    }

    fn exec(&self, sql: &str, params: &[SqlParam]) -> Result<ExecOutcome, ModelError> {
        debug!(sql = %sql, "executing");
        match self.store.execute(sql, params) {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.absorb(e).map(ExecOutcome::failed),
        }
    }

    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, ModelError> {
        debug!(sql = %sql, "querying");
        match self.store.query(sql, params) {
            Ok(rows) => Ok(rows),
            Err(e) => self.absorb(e).map(|_| Vec::new()),
        }
    }

    /// Applies the failure policy to a store error. Lenient mode logs it and
    /// hands back the message.
    fn absorb(&self, err: ModelError) -> Result<String, ModelError> {
        match self.options.failure_policy {
            FailurePolicy::Strict => Err(err),
            FailurePolicy::Lenient => {
                warn!(
                    table = %self.name,
                    store = %self.store.location(),
                    error = %err,
                    "statement failed; continuing"
                );
                Ok(err.to_string())
            }
        }
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, ModelError> {
    value
        .as_object()
        .ok_or_else(|| ModelError::InvalidFields(format!("expected a JSON object, got {}", value)))
}

/// Reads `PRAGMA table_info` and rebuilds column specs from it.
fn read_table_info(store: &dyn StoreClient, table: &str) -> Result<Vec<ColumnSpec>, ModelError> {
    let rows = store.query(&sql::table_info(table), &[])?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        // cid, name, type, notnull, dflt_value, pk
        let Some(name) = row.get(1).and_then(Value::as_str) else {
            continue;
        };
        let mut tokens = Vec::new();
        if let Some(ty) = row.get(2).and_then(Value::as_str).filter(|t| !t.is_empty()) {
            tokens.push(ty.to_string());
        }
        if row.get(5).and_then(Value::as_i64).unwrap_or(0) > 0 {
            tokens.push("PRIMARY KEY".to_string());
        }
        if row.get(3).and_then(Value::as_i64).unwrap_or(0) != 0 {
            tokens.push("NOT NULL".to_string());
        }
        if let Some(default) = row.get(4).and_then(Value::as_str) {
            tokens.push(format!("DEFAULT {}", default));
        }
        columns.push(ColumnSpec {
            name: name.to_string(),
            tokens,
        });
    }
    Ok(columns)
}
