//! Result rows to JSON.
//!
//! sqlx receives results in Postgres' binary format, so only types with a
//! decoder here can be read directly. Every other column, `numeric`
//! included, is cast to `text` (or `text[]`) by the server before it is
//! fetched: its text output is exact and keeps a declared scale, which a
//! decoded `numeric` does not.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pglens_runtime::ResultColumn;
use serde_json::{Map, Value};
use sqlx::postgres::{PgRow, PgTypeInfo};
use sqlx::{Decode, Postgres, Row, Type, TypeInfo};
use uuid::Uuid;

/// Lowercase Postgres type name (`int4`, `timestamptz`, `text[]`).
pub fn type_name(info: &PgTypeInfo) -> String {
    info.name().to_ascii_lowercase()
}

/// Whether [`row_to_json`] reads `pg_type` from the binary format.
pub fn decodes_natively(pg_type: &str) -> bool {
    matches!(
        pg_type,
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "oid"
            | "float4"
            | "float8"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "uuid"
            | "date"
            | "time"
            | "timestamp"
            | "timestamptz"
            | "json"
            | "jsonb"
            | "bytea"
            | "bool[]"
            | "int2[]"
            | "int4[]"
            | "int8[]"
            | "float4[]"
            | "float8[]"
            | "text[]"
            | "varchar[]"
            | "name[]"
            | "uuid[]"
    )
}

/// The cast that turns a column of `pg_type` into something
/// [`decodes_natively`] accepts.
pub fn text_cast(pg_type: &str) -> &'static str {
    // sqlx names built-in arrays `numeric[]` and custom ones `_mood`.
    if pg_type.ends_with("[]") || pg_type.starts_with('_') {
        "text[]"
    } else {
        "text"
    }
}

/// One row as a JSON object keyed by `columns[i].name`.
///
/// `columns` must be the statement's columns in order, already made unique.
pub fn row_to_json(row: &PgRow, columns: &[ResultColumn]) -> Map<String, Value> {
    let mut obj = Map::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let pg_type = row
            .try_column(index)
            .map(|c| type_name(sqlx::Column::type_info(c)))
            .unwrap_or_default();
        obj.insert(column.name.clone(), decode_cell(row, index, &pg_type));
    }
    obj
}

fn decode_cell(row: &PgRow, index: usize, pg_type: &str) -> Value {
    match pg_type {
        "bool" => get::<bool>(row, index).map(Value::from),
        "int2" => get::<i16>(row, index).map(Value::from),
        "int4" => get::<i32>(row, index).map(Value::from),
        "int8" => get::<i64>(row, index).map(Value::from),
        "oid" => get::<sqlx::postgres::types::Oid>(row, index).map(|oid| Value::from(oid.0)),
        "float4" => get::<f32>(row, index).map(Value::from),
        "float8" => get::<f64>(row, index).map(Value::from),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, index).map(Value::String),
        "uuid" => get::<Uuid>(row, index).map(|id| Value::String(id.to_string())),
        "date" => get::<NaiveDate>(row, index).map(|d| Value::String(d.to_string())),
        "time" => get::<NaiveTime>(row, index).map(|t| Value::String(t.to_string())),
        "timestamp" => get::<NaiveDateTime>(row, index)
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "timestamptz" => get::<DateTime<Utc>>(row, index).map(|ts| Value::String(ts.to_rfc3339())),
        "json" | "jsonb" => get::<Value>(row, index),
        "bytea" => get::<Vec<u8>>(row, index).map(|bytes| Value::String(hex_bytes(&bytes))),
        "bool[]" => get::<Vec<Option<bool>>>(row, index).map(Value::from),
        "int2[]" => get::<Vec<Option<i16>>>(row, index).map(Value::from),
        "int4[]" => get::<Vec<Option<i32>>>(row, index).map(Value::from),
        "int8[]" => get::<Vec<Option<i64>>>(row, index).map(Value::from),
        "float4[]" => get::<Vec<Option<f32>>>(row, index).map(Value::from),
        "float8[]" => get::<Vec<Option<f64>>>(row, index).map(Value::from),
        "text[]" | "varchar[]" | "name[]" => get::<Vec<Option<String>>>(row, index).map(Value::from),
        "uuid[]" => get::<Vec<Option<Uuid>>>(row, index).map(|ids| {
            Value::Array(
                ids.into_iter()
                    .map(|id| id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null))
                    .collect(),
            )
        }),
        other => {
            // Unreachable when the statement went through the text casts.
            tracing::warn!(pg_type = other, column = index, "no decoder for column type");
            None
        }
    }
    .unwrap_or(Value::Null)
}

/// `None` for SQL `NULL` and for values that fail to decode as `T`.
fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Postgres `bytea` hex output form, `\x` followed by two digits per byte.
fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
