// sqlite-mcp-store/src/value.rs
// ============================================================================
// Module: SQL Values
// Description: Scalar values bound to and read from SQLite statements.
// Purpose: Convert between JSON arguments and driver-level values.
// Dependencies: base64, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! [`SqlValue`] is the only value type that crosses the binding boundary. JSON
//! arguments are converted into it strictly: arrays and arbitrary objects are
//! rejected, and blobs travel as `{"$blob": "<base64>"}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::error::DbError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON object key used to carry base64-encoded blobs.
pub const BLOB_KEY: &str = "$blob";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Scalar value accepted by the driver's binding mechanism.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Converts a JSON argument into a bindable value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] for arrays, objects that are not
    /// blob wrappers, non-finite numbers, or malformed base64.
    pub fn from_json(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(flag) => Ok(Self::Integer(i64::from(*flag))),
            Value::Number(number) => number_to_value(number),
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Object(map) => blob_from_object(map),
            Value::Array(_) => Err(DbError::InvalidParameters(
                "arrays cannot be bound as SQL parameters".to_string(),
            )),
        }
    }

    /// Converts the value into its JSON representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::from(*value),
            Self::Real(value) => Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::Text(text) => Value::String(text.clone()),
            Self::Blob(bytes) => blob_to_json(bytes),
        }
    }

    /// Returns the SQLite storage class name for this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Borrowed(ValueRef::Real(*value)),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

/// Converts a column value read from a row into JSON.
#[must_use]
pub fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => blob_to_json(bytes),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a JSON number onto an integer when exact, otherwise a real.
///
/// Unsigned integers above `i64::MAX` are refused rather than rounded.
fn number_to_value(number: &Number) -> Result<SqlValue, DbError> {
    if let Some(value) = number.as_i64() {
        return Ok(SqlValue::Integer(value));
    }
    if number.is_u64() {
        return Err(DbError::InvalidParameters(format!(
            "integer {number} is outside the signed 64-bit range"
        )));
    }
    match number.as_f64() {
        Some(value) if value.is_finite() => Ok(SqlValue::Real(value)),
        _ => Err(DbError::InvalidParameters(format!("number {number} cannot be bound"))),
    }
}

/// Decodes a `{"$blob": "..."}` wrapper.
fn blob_from_object(map: &Map<String, Value>) -> Result<SqlValue, DbError> {
    let encoded = match (map.len(), map.get(BLOB_KEY)) {
        (1, Some(Value::String(encoded))) => encoded,
        _ => {
            return Err(DbError::InvalidParameters(format!(
                "objects cannot be bound as SQL parameters (use {{\"{BLOB_KEY}\": \"<base64>\"}} \
                 for blobs)"
            )));
        }
    };
    STANDARD
        .decode(encoded)
        .map(SqlValue::Blob)
        .map_err(|err| DbError::InvalidParameters(format!("invalid base64 blob: {err}")))
}

/// Encodes bytes as a blob wrapper object.
fn blob_to_json(bytes: &[u8]) -> Value {
    let mut map = Map::new();
    map.insert(BLOB_KEY.to_string(), Value::String(STANDARD.encode(bytes)));
    Value::Object(map)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::SqlValue;
    use crate::error::ErrorKind;

    #[test]
    fn json_scalars_map_to_storage_classes() {
        assert_eq!(SqlValue::from_json(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(SqlValue::from_json(&json!(42)).unwrap(), SqlValue::Integer(42));
        assert_eq!(SqlValue::from_json(&json!(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from_json(&json!("Ann")).unwrap(), SqlValue::Text("Ann".into()));
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        assert_eq!(
            SqlValue::from_json(&json!(i64::MAX)).unwrap(),
            SqlValue::Integer(i64::MAX)
        );
        let err = SqlValue::from_json(&json!(u64::MAX)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert!(err.to_string().contains("18446744073709551615"));
    }

    #[test]
    fn blob_wrapper_decodes_base64() {
        let value = SqlValue::from_json(&json!({"$blob": "AAEC"})).unwrap();
        assert_eq!(value, SqlValue::Blob(vec![0, 1, 2]));
        assert_eq!(value.to_json(), json!({"$blob": "AAEC"}));
    }

    #[test]
    fn arrays_and_plain_objects_are_rejected() {
        let err = SqlValue::from_json(&json!([1, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        let err = SqlValue::from_json(&json!({"name": "x"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        let err = SqlValue::from_json(&json!({"$blob": "not base64!"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }
}
