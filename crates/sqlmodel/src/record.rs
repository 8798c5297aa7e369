use std::fmt;

use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::error::ModelError;
use crate::schema::ID_COLUMN;
use crate::sql::quote_ident;
use crate::store::{ExecOutcome, Row};
use crate::table::Table;
use crate::value::sql_literal;

/// One materialized row, bound to the table it was read from.
///
/// Fields are addressed by column name through [`Record::get`] and
/// [`Record::set`]. The `id` seen at load time is the key for every later
/// [`save`](Record::save), [`is_exist`](Record::is_exist) and
/// [`remove`](Record::remove), even if the `id` field is reassigned.
///
/// Records are produced by [`Table`] reads only.
#[derive(Debug)]
pub struct Record {
    table: Table,
    columns: Vec<String>,
    values: Vec<Value>,
    /// Values as last loaded or saved; used by change tracking.
    snapshot: Vec<Value>,
    loaded_id: Option<Value>,
}

impl Record {
    /// Maps a positional row onto `columns`. `index` is the row's position in
    /// its result set, reported on width mismatch.
    pub(crate) fn from_row(
        table: Table,
        columns: Vec<String>,
        row: Row,
        index: usize,
    ) -> Result<Self, ModelError> {
        if row.len() != columns.len() {
            return Err(ModelError::RowWidth {
                row: index,
                expected: columns.len(),
                got: row.len(),
            });
        }
        let loaded_id = id_in(&columns, &row);
        Ok(Self {
            table,
            columns,
            snapshot: row.clone(),
            values: row,
            loaded_id,
        })
    }

    /// The table this record routes its writes through.
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.values[i])
    }

    /// Assigns a field. Unknown names are rejected.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let i = self.position(name).ok_or_else(|| ModelError::UnknownColumn {
            table: self.table.name().to_string(),
            column: name.to_string(),
        })?;
        self.values[i] = value.into();
        Ok(())
    }

    /// Current value of the `id` field.
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_COLUMN)
    }

    /// `(name, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Fields whose value differs from the last load or save.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(self.values.iter().zip(&self.snapshot))
            .filter(|(_, (now, then))| now != then)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The record as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }

    fn to_map(&self) -> Map<String, Value> {
        self.fields()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn key(&self) -> Result<&Value, ModelError> {
        self.loaded_id
            .as_ref()
            .filter(|id| !id.is_null())
            .ok_or(ModelError::MissingId)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Whether the row this record was loaded from is still in the store.
    pub fn is_exist(&self) -> Result<bool, ModelError> {
        match self.key() {
            Ok(id) => self.table.exists(id),
            Err(_) if self.position(ID_COLUMN).is_some() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Persists the record.
    ///
    /// If the row exists, every non-id field is written with one `update`
    /// per column keyed on the loaded id (only modified fields when change
    /// tracking is enabled). The updates are not atomic as a group.
    ///
    /// Otherwise the current fields are inserted as a new row. A `NULL` id
    /// lets the store assign one, which is then written back to the record.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn save(&mut self) -> Result<ExecOutcome, ModelError> {
        if self.is_exist()? {
            let key = self.key()?;
            let condition = format!("{} = {}", quote_ident(ID_COLUMN), sql_literal(key));
            let track = self.table.options().track_changes;

            let mut outcome = ExecOutcome::default();
            for (i, column) in self.columns.iter().enumerate() {
                if column == ID_COLUMN || (track && self.values[i] == self.snapshot[i]) {
                    continue;
                }
                outcome.merge(self.table.update(column, &self.values[i], Some(&condition))?);
            }
            debug!(id = %key, affected = outcome.affected, "record updated");
            if outcome.is_ok() {
                self.snapshot = self.values.clone();
            }
            return Ok(outcome);
        }

        let mut fields = self.to_map();
        if fields.get(ID_COLUMN).is_some_and(Value::is_null) {
            fields.remove(ID_COLUMN);
        }
        let outcome = self.table.add(&Value::Object(fields))?;
        if outcome.is_ok() {
            if let (Some(pos), Some(rowid)) = (self.position(ID_COLUMN), outcome.last_insert_id) {
                self.values[pos] = json!(rowid);
            }
            self.loaded_id = id_in(&self.columns, &self.values);
            self.snapshot = self.values.clone();
            debug!(id = ?self.loaded_id, "record inserted");
        }
        Ok(outcome)
    }

    /// Deletes the row by its loaded id. The record is consumed.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn remove(self) -> Result<ExecOutcome, ModelError> {
        let key = self.key()?.clone();
        self.table.remove(&json!({ ID_COLUMN: key }))
    }

    /// Rebinds the record to table `name`.
    ///
    /// The target schema is discovered from the store and the record's
    /// current values are remapped positionally onto its columns, so the
    /// value count must equal the new column count.
    #[instrument(skip_all, fields(from = %self.table.name(), to = %name))]
    pub fn new_table_to_connect(&mut self, name: &str) -> Result<(), ModelError> {
        let table = Table::discover(self.table.store().clone(), name)?
            .with_options(self.table.options().clone());
        let columns = table.column_names();
        if columns.len() != self.values.len() {
            return Err(ModelError::RowWidth {
                row: 0,
                expected: columns.len(),
                got: self.values.len(),
            });
        }
        self.loaded_id = id_in(&columns, &self.values);
        self.snapshot = self.values.clone();
        self.columns = columns;
        self.table = table;
        debug!("record rebound");
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn id_in(columns: &[String], values: &[Value]) -> Option<Value> {
    columns
        .iter()
        .position(|c| c == ID_COLUMN)
        .and_then(|i| values.get(i).cloned())
}
