//! Conversions between JSON field values and SQLite values.
//!
//! Records and filters carry `serde_json::Value`s. Bound parameters become
//! [`SqlParam`]s; the raw `update` path renders SQL literals instead.
//!
//! Cells JSON cannot represent directly are read as single-key tagged
//! objects holding lowercase hex, and are written back byte for byte:
//!
//! - BLOB: `{"$blob": "deadbeef"}`
//! - TEXT that is not valid UTF-8: `{"$text": "ff61"}`

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::{Map, Value};

pub const BLOB_TAG: &str = "$blob";
pub const RAW_TEXT_TAG: &str = "$text";

/// A bound statement parameter.
///
/// `RawText` carries TEXT bytes that are not valid UTF-8, which
/// [`SqlValue::Text`] cannot hold.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Value(SqlValue),
    RawText(Vec<u8>),
}

impl From<SqlValue> for SqlParam {
    fn from(value: SqlValue) -> Self {
        Self::Value(value)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Value(v) => v.to_sql(),
            SqlParam::RawText(bytes) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(bytes))),
        }
    }
}

/// Builds the JSON form of a BLOB cell.
pub fn blob(bytes: &[u8]) -> Value {
    tagged(BLOB_TAG, bytes)
}

fn tagged(tag: &str, bytes: &[u8]) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), Value::String(hex::encode(bytes)));
    Value::Object(map)
}

/// Bytes carried by a tagged object, if `val` is one.
fn untag(val: &Value) -> Option<(&'static str, Vec<u8>)> {
    let obj = val.as_object().filter(|o| o.len() == 1)?;
    let (key, payload) = obj.iter().next()?;
    let tag = match key.as_str() {
        BLOB_TAG => BLOB_TAG,
        RAW_TEXT_TAG => RAW_TEXT_TAG,
        _ => return None,
    };
    let bytes = hex::decode(payload.as_str()?).ok()?;
    Some((tag, bytes))
}

/// Converts a JSON value into a parameter for binding.
///
/// Booleans are stored as INTEGER 0/1; tagged objects go back to their
/// storage class; other arrays and objects are stored as their JSON text.
pub fn json_to_sql(val: &Value) -> SqlParam {
    let value = match val {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => match untag(val) {
            Some((BLOB_TAG, bytes)) => SqlValue::Blob(bytes),
            Some((_, bytes)) => return SqlParam::RawText(bytes),
            None => SqlValue::Text(val.to_string()),
        },
    };
    SqlParam::Value(value)
}

/// Converts a borrowed SQLite cell into JSON.
pub fn sql_to_json(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => tagged(RAW_TEXT_TAG, t),
        },
        ValueRef::Blob(b) => blob(b),
    }
}

/// Renders a JSON value as an SQL literal for interpolation into statement
/// text. Text is single-quoted with embedded quotes doubled.
pub fn sql_literal(val: &Value) -> String {
    match val {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s),
        Value::Array(_) | Value::Object(_) => match untag(val) {
            Some((BLOB_TAG, bytes)) => format!("X'{}'", hex::encode_upper(bytes)),
            Some((_, bytes)) => format!("CAST(X'{}' AS TEXT)", hex::encode_upper(bytes)),
            None => quote_text(&val.to_string()),
        },
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
