//! JSON parameter values coerced to the types Postgres inferred for each
//! placeholder.
//!
//! The statement is described first; every `$n` then gets a value of the
//! matching Rust type so the server never has to guess. JSON `null` binds a
//! typed SQL `NULL`.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pglens_runtime::ExecutionError;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use std::str::FromStr;
use uuid::Uuid;

/// A parameter ready to bind. `None` is a typed `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum PgParam {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Numeric(Option<BigDecimal>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Timestamp(Option<NaiveDateTime>),
    Timestamptz(Option<DateTime<Utc>>),
    Json(Option<Value>),
}

fn args_add<T>(args: &mut PgArguments, v: T) -> Result<(), String>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(|e| e.to_string())
}

impl PgParam {
    /// Coerce `value` for a placeholder whose inferred type is `pg_type`
    /// (a lowercase type name such as `int4` or `timestamptz`).
    ///
    /// Error text names the expected and received kinds, never the value.
    pub fn coerce(value: &Value, pg_type: &str) -> Result<Self, String> {
        let param = match pg_type {
            "bool" => PgParam::Bool(convert(value, "a boolean", as_bool)?),
            "int2" => PgParam::Int2(convert(value, "a 16-bit integer", |v| {
                as_i64(v).and_then(|n| i16::try_from(n).ok())
            })?),
            "int4" => PgParam::Int4(convert(value, "a 32-bit integer", |v| {
                as_i64(v).and_then(|n| i32::try_from(n).ok())
            })?),
            "int8" => PgParam::Int8(convert(value, "an integer", as_i64)?),
            "float4" => PgParam::Float4(convert(value, "a number", |v| as_f64(v).map(|n| n as f32))?),
            "float8" => PgParam::Float8(convert(value, "a number", as_f64)?),
            "numeric" => PgParam::Numeric(convert(value, "a decimal number", as_decimal)?),
            "text" | "varchar" | "bpchar" | "name" | "citext" | "unknown" => {
                PgParam::Text(convert(value, "a string", as_text)?)
            }
            "uuid" => PgParam::Uuid(convert(value, "a UUID string", |v| {
                v.as_str().and_then(|s| Uuid::parse_str(s).ok())
            })?),
            "date" => PgParam::Date(convert(value, "a date (YYYY-MM-DD)", |v| {
                v.as_str().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            })?),
            "time" => PgParam::Time(convert(value, "a time (HH:MM:SS)", |v| {
                v.as_str().and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok())
            })?),
            "timestamp" => PgParam::Timestamp(convert(value, "a timestamp", |v| {
                v.as_str().and_then(parse_timestamp)
            })?),
            "timestamptz" => PgParam::Timestamptz(convert(value, "an RFC 3339 timestamp", |v| {
                v.as_str().and_then(parse_timestamptz)
            })?),
            "json" | "jsonb" => PgParam::Json((!value.is_null()).then(|| value.clone())),
            other => {
                return Err(format!(
                    "placeholders of type {other} are not supported; cast it in the query, e.g. $1::text"
                ));
            }
        };
        Ok(param)
    }

    pub fn add_to(self, args: &mut PgArguments) -> Result<(), String> {
        match self {
            PgParam::Bool(v) => args_add(args, v),
            PgParam::Int2(v) => args_add(args, v),
            PgParam::Int4(v) => args_add(args, v),
            PgParam::Int8(v) => args_add(args, v),
            PgParam::Float4(v) => args_add(args, v),
            PgParam::Float8(v) => args_add(args, v),
            PgParam::Numeric(v) => args_add(args, v),
            PgParam::Text(v) => args_add(args, v),
            PgParam::Uuid(v) => args_add(args, v),
            PgParam::Date(v) => args_add(args, v),
            PgParam::Time(v) => args_add(args, v),
            PgParam::Timestamp(v) => args_add(args, v),
            PgParam::Timestamptz(v) => args_add(args, v),
            PgParam::Json(v) => args_add(args, v.map(sqlx::types::Json)),
        }
    }
}

/// Bind `values` against the placeholder types of a described statement.
pub fn bind_params(values: &[Value], pg_types: &[String]) -> Result<PgArguments, ExecutionError> {
    if values.len() != pg_types.len() {
        return Err(ExecutionError::Parameter(format!(
            "query has {} placeholder(s) but {} parameter(s) were supplied",
            pg_types.len(),
            values.len()
        )));
    }

    let mut args = PgArguments::default();
    for (index, (value, pg_type)) in values.iter().zip(pg_types).enumerate() {
        PgParam::coerce(value, pg_type)
            .and_then(|param| param.add_to(&mut args))
            .map_err(|reason| ExecutionError::Parameter(format!("parameter ${}: {}", index + 1, reason)))?;
    }
    Ok(args)
}

fn convert<T>(value: &Value, expected: &str, parse: impl Fn(&Value) -> Option<T>) -> Result<Option<T>, String> {
    if value.is_null() {
        return Ok(None);
    }
    parse(value)
        .map(Some)
        .ok_or_else(|| format!("expected {expected}, got {}", kind(value)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" => Some(true),
            "false" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc3339(&s.replacen(' ', "T", 1)))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
