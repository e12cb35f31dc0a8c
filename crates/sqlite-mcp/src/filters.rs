// sqlite-mcp/src/filters.rs
// ============================================================================
// Module: Filter and Sort Builders
// Description: Parse filter and order_by arguments into bound SQL clauses.
// Purpose: Keep caller values out of SQL text.
// Dependencies: sqlite-mcp-store, serde_json
// ============================================================================

//! ## Overview
//! Filters map a column to a bare value or to `{ "op": ..., "value": ... }`.
//! Parsing happens before any connection is used; column names are
//! resolved against the live schema by the caller, and rendering only ever
//! emits quoted identifiers and `?` placeholders.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use sqlite_mcp_store::DbError;
use sqlite_mcp_store::SqlValue;
use sqlite_mcp_store::sql::quote_identifier;

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `LIKE`
    Like,
}

impl CompareOp {
    /// Returns the SQL operator.
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Predicate applied to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column compared to one bound value.
    Compare(CompareOp, SqlValue),
    /// Column in a non-empty list of bound values.
    In(Vec<SqlValue>),
    /// `IS NULL` when true, `IS NOT NULL` when false.
    IsNull(bool),
}

/// One filter condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column name; replaced with the catalog spelling before rendering.
    pub column: String,
    /// Predicate for the column.
    pub predicate: Predicate,
}

/// Rendered `WHERE` clause with its bound values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// ` WHERE ...` or empty.
    pub sql: String,
    /// Values in placeholder order.
    pub params: Vec<SqlValue>,
}

/// Parses a filter object into conditions in key order.
///
/// # Errors
///
/// Returns [`DbError::InvalidParameters`] for unknown operators, missing or
/// unbindable values, or an empty `in` list.
pub fn parse_filter(filter: Option<&Map<String, Value>>) -> Result<Vec<Condition>, DbError> {
    let Some(filter) = filter else {
        return Ok(Vec::new());
    };
    filter
        .iter()
        .map(|(column, raw)| {
            if column.is_empty() {
                return Err(DbError::InvalidParameters("filter column name is empty".to_string()));
            }
            Ok(Condition {
                column: column.clone(),
                predicate: parse_predicate(column, raw)?,
            })
        })
        .collect()
}

/// Parses one filter value.
fn parse_predicate(column: &str, raw: &Value) -> Result<Predicate, DbError> {
    let operator = match raw {
        Value::Null => return Ok(Predicate::IsNull(true)),
        Value::Object(map) if map.contains_key("op") => map,
        other => return Ok(Predicate::Compare(CompareOp::Eq, bind_value(column, other)?)),
    };
    if let Some(key) = operator.keys().find(|key| *key != "op" && *key != "value") {
        return Err(DbError::InvalidParameters(format!(
            "filter on {column} has unexpected key {key}"
        )));
    }
    let op = operator.get("op").and_then(Value::as_str).ok_or_else(|| {
        DbError::InvalidParameters(format!("filter on {column} needs a string op"))
    })?;
    let value = operator.get("value");
    let compare = match op {
        "eq" => CompareOp::Eq,
        "ne" => CompareOp::Ne,
        "lt" => CompareOp::Lt,
        "lte" => CompareOp::Lte,
        "gt" => CompareOp::Gt,
        "gte" => CompareOp::Gte,
        "like" => CompareOp::Like,
        "in" => return parse_in(column, value),
        "is_null" => {
            return match value {
                None => Ok(Predicate::IsNull(true)),
                Some(Value::Bool(flag)) => Ok(Predicate::IsNull(*flag)),
                Some(_) => Err(DbError::InvalidParameters(format!(
                    "is_null filter on {column} takes a boolean value"
                ))),
            };
        }
        other => {
            return Err(DbError::InvalidParameters(format!(
                "unknown filter op {other} on {column}"
            )));
        }
    };
    match (compare, value) {
        (CompareOp::Eq, Some(Value::Null)) => Ok(Predicate::IsNull(true)),
        (CompareOp::Ne, Some(Value::Null)) => Ok(Predicate::IsNull(false)),
        (CompareOp::Like, Some(Value::String(pattern))) => {
            Ok(Predicate::Compare(CompareOp::Like, SqlValue::Text(pattern.clone())))
        }
        (CompareOp::Like, _) => Err(DbError::InvalidParameters(format!(
            "like filter on {column} takes a string pattern"
        ))),
        (_, None | Some(Value::Null)) => Err(DbError::InvalidParameters(format!(
            "{op} filter on {column} needs a non-null value"
        ))),
        (compare, Some(value)) => Ok(Predicate::Compare(compare, bind_value(column, value)?)),
    }
}

/// Parses an `in` list.
fn parse_in(column: &str, value: Option<&Value>) -> Result<Predicate, DbError> {
    match value {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| bind_value(column, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Predicate::In),
        _ => Err(DbError::InvalidParameters(format!(
            "in filter on {column} needs a non-empty array"
        ))),
    }
}

/// Converts a filter value, naming the column on failure.
fn bind_value(column: &str, value: &Value) -> Result<SqlValue, DbError> {
    SqlValue::from_json(value).map_err(|err| match err {
        DbError::InvalidParameters(message) => {
            DbError::InvalidParameters(format!("filter on {column}: {message}"))
        }
        other => other,
    })
}

/// Renders conditions joined with `AND`.
#[must_use]
pub fn render_where(conditions: &[Condition]) -> WhereClause {
    if conditions.is_empty() {
        return WhereClause::default();
    }
    let mut params = Vec::new();
    let parts: Vec<String> = conditions
        .iter()
        .map(|condition| {
            let column = quote_identifier(&condition.column);
            match &condition.predicate {
                Predicate::Compare(op, value) => {
                    params.push(value.clone());
                    format!("{column} {} ?", op.sql())
                }
                Predicate::In(values) => {
                    params.extend(values.iter().cloned());
                    let slots = vec!["?"; values.len()].join(", ");
                    format!("{column} IN ({slots})")
                }
                Predicate::IsNull(true) => format!("{column} IS NULL"),
                Predicate::IsNull(false) => format!("{column} IS NOT NULL"),
            }
        })
        .collect();
    WhereClause {
        sql: format!(" WHERE {}", parts.join(" AND ")),
        params,
    }
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    /// Column name; replaced with the catalog spelling before rendering.
    pub column: String,
    /// True for descending order.
    pub descending: bool,
}

/// Parses an `order_by` argument.
///
/// Accepts `"col"`, `"col desc"`, comma-separated lists of those,
/// `{ "column": ..., "direction": ... }`, or an array mixing both forms.
///
/// # Errors
///
/// Returns [`DbError::InvalidParameters`] for malformed terms.
pub fn parse_order_by(value: Option<&Value>) -> Result<Vec<OrderTerm>, DbError> {
    let mut terms = Vec::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                push_order_item(item, &mut terms)?;
            }
        }
        Some(item) => push_order_item(item, &mut terms)?,
    }
    Ok(terms)
}

/// Parses one string or object order item.
fn push_order_item(item: &Value, terms: &mut Vec<OrderTerm>) -> Result<(), DbError> {
    match item {
        Value::String(text) => {
            for part in text.split(',') {
                let mut words = part.split_whitespace();
                let column = words.next().ok_or_else(|| {
                    DbError::InvalidParameters("order_by contains an empty term".to_string())
                })?;
                let descending = parse_direction(words.next())?;
                if words.next().is_some() {
                    return Err(DbError::InvalidParameters(format!(
                        "order_by term has trailing text: {}",
                        part.trim()
                    )));
                }
                terms.push(OrderTerm {
                    column: column.to_string(),
                    descending,
                });
            }
            Ok(())
        }
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|key| *key != "column" && *key != "direction") {
                return Err(DbError::InvalidParameters(format!(
                    "order_by object has unexpected key {key}"
                )));
            }
            let column = map
                .get("column")
                .and_then(Value::as_str)
                .filter(|column| !column.is_empty())
                .ok_or_else(|| {
                    DbError::InvalidParameters("order_by object needs a column".to_string())
                })?;
            let direction = match map.get("direction") {
                None | Some(Value::Null) => None,
                Some(Value::String(direction)) => Some(direction.as_str()),
                Some(_) => {
                    return Err(DbError::InvalidParameters(
                        "order_by direction must be a string".to_string(),
                    ));
                }
            };
            terms.push(OrderTerm {
                column: column.to_string(),
                descending: parse_direction(direction)?,
            });
            Ok(())
        }
        _ => Err(DbError::InvalidParameters(
            "order_by entries must be strings or objects".to_string(),
        )),
    }
}

/// Parses `asc` / `desc`, defaulting to ascending.
fn parse_direction(direction: Option<&str>) -> Result<bool, DbError> {
    match direction {
        None => Ok(false),
        Some(word) if word.eq_ignore_ascii_case("asc") => Ok(false),
        Some(word) if word.eq_ignore_ascii_case("desc") => Ok(true),
        Some(word) => {
            Err(DbError::InvalidParameters(format!("order_by direction must be asc or desc: {word}")))
        }
    }
}

/// Renders ` ORDER BY ...` or an empty string.
#[must_use]
pub fn render_order_by(terms: &[OrderTerm]) -> String {
    if terms.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = terms
        .iter()
        .map(|term| {
            let direction = if term.descending { "DESC" } else { "ASC" };
            format!("{} {direction}", quote_identifier(&term.column))
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// Escapes `LIKE` wildcards so a search term matches literally with
/// `ESCAPE '\'`.
#[must_use]
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use serde_json::Value;
    use serde_json::json;
    use sqlite_mcp_store::ErrorKind;
    use sqlite_mcp_store::SqlValue;

    use super::escape_like;
    use super::parse_filter;
    use super::parse_order_by;
    use super::render_order_by;
    use super::render_where;

    /// Parses and renders a filter literal.
    fn filter(value: &Value) -> super::WhereClause {
        render_where(&parse_filter(value.as_object()).unwrap())
    }

    #[test]
    fn bare_values_bind_as_equality_and_null_as_is_null() {
        let clause = filter(&json!({ "age": 30, "email": null }));
        assert_eq!(clause.sql, " WHERE \"age\" = ? AND \"email\" IS NULL");
        assert_eq!(clause.params, vec![SqlValue::Integer(30)]);
    }

    #[test]
    fn operators_render_with_placeholders_only() {
        let clause = filter(&json!({
            "age": { "op": "gte", "value": 18 },
            "id": { "op": "in", "value": [1, 2, 3] },
            "name": { "op": "like", "value": "A%" },
            "note": { "op": "is_null", "value": false }
        }));
        assert_eq!(
            clause.sql,
            " WHERE \"age\" >= ? AND \"id\" IN (?, ?, ?) AND \"name\" LIKE ? AND \"note\" IS NOT NULL"
        );
        assert_eq!(clause.params.len(), 5);
    }

    #[test]
    fn hostile_column_names_stay_quoted() {
        let clause = filter(&json!({ "a\" OR 1=1 --": 1 }));
        assert_eq!(clause.sql, " WHERE \"a\"\" OR 1=1 --\" = ?");
    }

    #[test]
    fn malformed_filters_are_invalid_parameters() {
        for bad in [
            json!({ "id": { "op": "in", "value": [] } }),
            json!({ "id": { "op": "between", "value": 1 } }),
            json!({ "id": { "op": "gt" } }),
            json!({ "id": { "op": "eq", "value": 1, "extra": true } }),
            json!({ "id": [1, 2] }),
            json!({ "name": { "op": "like", "value": 3 } }),
        ] {
            let err = parse_filter(bad.as_object()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameters, "{bad}");
        }
    }

    #[test]
    fn order_by_accepts_every_form() {
        let terms = parse_order_by(Some(&json!([
            "name",
            "age desc, id ASC",
            { "column": "email", "direction": "desc" }
        ])))
        .unwrap();
        assert_eq!(
            render_order_by(&terms),
            " ORDER BY \"name\" ASC, \"age\" DESC, \"id\" ASC, \"email\" DESC"
        );
        assert!(parse_order_by(Some(&json!("name sideways"))).is_err());
        assert!(parse_order_by(Some(&json!("name desc; DROP TABLE t"))).is_err());
        assert!(parse_order_by(Some(&json!(7))).is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
