// sqlite-mcp/src/schema.rs
// ============================================================================
// Module: Schema Session
// Description: One lease, one deadline, and cached catalog reads per call.
// Purpose: Validate identifiers against the live schema before building SQL.
// Dependencies: sqlite-mcp-store, serde_json
// ============================================================================

//! ## Overview
//! A [`SchemaSession`] is opened once per tool invocation. It owns the lease
//! for the whole call, shares one deadline across every statement, and
//! caches table and column lookups for the lifetime of the call only.
//! Identifiers supplied by callers are matched against the catalog and the
//! catalog spelling is what ends up, quoted, in generated SQL. Catalog reads
//! are exempt from `max_result_rows`, which bounds caller-visible data only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Map;
use serde_json::Value;
use sqlite_mcp_store::AccessMode;
use sqlite_mcp_store::ConnectionLease;
use sqlite_mcp_store::DatabasePath;
use sqlite_mcp_store::DbError;
use sqlite_mcp_store::QueryExecutor;
use sqlite_mcp_store::QueryResult;
use sqlite_mcp_store::SqlValue;
use sqlite_mcp_store::Statement;

// ============================================================================
// SECTION: Catalog SQL
// ============================================================================

/// Lists user tables and views, skipping `sqlite_` internals.
const LIST_TABLES_SQL: &str = "SELECT name, type, sql FROM sqlite_master WHERE type IN ('table', \
                               'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name";

/// Column metadata for one table.
const TABLE_INFO_SQL: &str =
    "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";

/// Foreign keys declared by one table.
const FOREIGN_KEYS_SQL: &str = "SELECT id, seq, \"table\", \"from\", \"to\", on_update, on_delete \
                                FROM pragma_foreign_key_list(?) ORDER BY id, seq";

/// Indexes defined on one table.
const INDEXES_SQL: &str =
    "SELECT name, \"unique\", origin, partial FROM pragma_index_list(?) ORDER BY name";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Kind of schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Ordinary table.
    Table,
    /// View.
    View,
}

impl TableKind {
    /// Returns the `sqlite_master` type label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

/// One table or view from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Catalog name.
    pub name: String,
    /// Table or view.
    pub kind: TableKind,
    /// Creation SQL, absent for some internal objects.
    pub sql: Option<String>,
}

/// SQLite type affinity derived from a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// `INT` anywhere in the declared type.
    Integer,
    /// `CHAR`, `CLOB`, or `TEXT`.
    Text,
    /// `BLOB` or no declared type.
    Blob,
    /// `REAL`, `FLOA`, or `DOUB`.
    Real,
    /// Anything else.
    Numeric,
}

impl Affinity {
    /// Applies SQLite's affinity rules in order.
    #[must_use]
    pub fn from_decl_type(decl_type: &str) -> Self {
        let upper = decl_type.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|needle| upper.contains(needle)) {
            Self::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Self::Blob
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|needle| upper.contains(needle)) {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    /// Returns true for affinities where min, max, and avg are meaningful.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real | Self::Numeric)
    }

    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Real => "real",
            Self::Numeric => "numeric",
        }
    }
}

/// One column from `pragma_table_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column ordinal.
    pub cid: i64,
    /// Catalog name.
    pub name: String,
    /// Declared type, possibly empty.
    pub decl_type: String,
    /// True when declared `NOT NULL`.
    pub notnull: bool,
    /// Default value expression as text, or null.
    pub default_value: Value,
    /// Position in the primary key, zero when not part of it.
    pub pk: i64,
}

impl ColumnInfo {
    /// Returns the column's type affinity.
    #[must_use]
    pub fn affinity(&self) -> Affinity {
        Affinity::from_decl_type(&self.decl_type)
    }

    /// Returns true for columns that text search should scan.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.decl_type.trim().is_empty() || self.affinity() == Affinity::Text
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Lease, deadline, and schema cache for one tool invocation.
pub struct SchemaSession<'a> {
    /// Executor that runs every statement.
    executor: &'a QueryExecutor,
    /// Connection held for the whole invocation.
    lease: ConnectionLease,
    /// Deadline shared by every statement.
    deadline: Instant,
    /// Catalog listing, loaded on first use.
    tables: Option<Vec<TableEntry>>,
    /// Column listings keyed by catalog table name.
    columns: BTreeMap<String, Vec<ColumnInfo>>,
}

impl<'a> SchemaSession<'a> {
    /// Acquires a lease for `database` and starts the invocation deadline.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when no connection can be acquired.
    pub fn open(
        executor: &'a QueryExecutor,
        database: &DatabasePath,
        mode: AccessMode,
    ) -> Result<Self, DbError> {
        let deadline = executor.deadline();
        let lease = executor.manager().acquire(database, mode)?;
        Ok(Self {
            executor,
            lease,
            deadline,
            tables: None,
            columns: BTreeMap::new(),
        })
    }

    /// Returns the executor limits' row cap.
    #[must_use]
    pub const fn max_result_rows(&self) -> usize {
        self.executor.limits().max_result_rows
    }

    /// Runs one statement on the session lease.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] from the executor.
    pub fn run(&mut self, statement: &Statement) -> Result<QueryResult, DbError> {
        self.executor.execute_on(&mut self.lease, statement, self.deadline)
    }

    /// Runs `body` inside one `BEGIN IMMEDIATE` transaction on the lease.
    ///
    /// # Errors
    ///
    /// Returns the body error after rolling back, or a transaction control
    /// failure.
    pub fn transaction<T>(
        &mut self,
        body: impl FnOnce(&QueryExecutor, &mut ConnectionLease, Instant) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let deadline = self.deadline;
        self.executor.transaction(&mut self.lease, deadline, |executor, lease| {
            body(executor, lease, deadline)
        })
    }

    /// Returns user tables and views in name order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the catalog cannot be read.
    pub fn tables(&mut self) -> Result<&[TableEntry], DbError> {
        if self.tables.is_none() {
            let result = self.run(&Statement::new(LIST_TABLES_SQL).uncapped())?;
            let entries = result
                .rows
                .iter()
                .filter_map(|row| {
                    let name = text(row, "name")?;
                    let kind = match text(row, "type")?.as_str() {
                        "view" => TableKind::View,
                        _ => TableKind::Table,
                    };
                    Some(TableEntry {
                        name,
                        kind,
                        sql: text(row, "sql"),
                    })
                })
                .collect();
            self.tables = Some(entries);
        }
        Ok(self.tables.as_deref().unwrap_or_default())
    }

    /// Matches a caller-supplied table name to its catalog spelling.
    ///
    /// Exact matches win; otherwise a unique ASCII case-insensitive match is
    /// accepted, mirroring how SQLite resolves identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when no table or view matches.
    pub fn resolve_table(&mut self, requested: &str) -> Result<String, DbError> {
        let tables = self.tables()?;
        let found = tables
            .iter()
            .find(|entry| entry.name == requested)
            .or_else(|| tables.iter().find(|entry| entry.name.eq_ignore_ascii_case(requested)));
        found
            .map(|entry| entry.name.clone())
            .ok_or_else(|| DbError::NotFound(format!("table not found: {requested}")))
    }

    /// Returns the columns of a table already resolved by [`Self::resolve_table`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the pragma cannot be read.
    pub fn columns(&mut self, table: &str) -> Result<&[ColumnInfo], DbError> {
        if !self.columns.contains_key(table) {
            let statement = Statement::new(TABLE_INFO_SQL)
                .bind(vec![SqlValue::Text(table.to_string())])
                .uncapped();
            let result = self.run(&statement)?;
            let columns = result
                .rows
                .iter()
                .filter_map(|row| {
                    Some(ColumnInfo {
                        cid: integer(row, "cid")?,
                        name: text(row, "name")?,
                        decl_type: text(row, "type").unwrap_or_default(),
                        notnull: integer(row, "notnull").unwrap_or(0) != 0,
                        default_value: row.get("dflt_value").cloned().unwrap_or(Value::Null),
                        pk: integer(row, "pk").unwrap_or(0),
                    })
                })
                .collect();
            self.columns.insert(table.to_string(), columns);
        }
        Ok(self.columns.get(table).map(Vec::as_slice).unwrap_or_default())
    }

    /// Matches a caller-supplied column name to its catalog spelling.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when the table has no such column.
    pub fn resolve_column(&mut self, table: &str, requested: &str) -> Result<String, DbError> {
        let columns = self.columns(table)?;
        let found = columns
            .iter()
            .find(|column| column.name == requested)
            .or_else(|| columns.iter().find(|column| column.name.eq_ignore_ascii_case(requested)));
        found
            .map(|column| column.name.clone())
            .ok_or_else(|| DbError::NotFound(format!("column not found: {table}.{requested}")))
    }

    /// Returns the foreign keys declared by a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the pragma cannot be read.
    pub fn foreign_keys(&mut self, table: &str) -> Result<Vec<Map<String, Value>>, DbError> {
        let statement = Statement::new(FOREIGN_KEYS_SQL)
            .bind(vec![SqlValue::Text(table.to_string())])
            .uncapped();
        Ok(self.run(&statement)?.rows)
    }

    /// Returns the indexes defined on a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the pragma cannot be read.
    pub fn indexes(&mut self, table: &str) -> Result<Vec<Map<String, Value>>, DbError> {
        let statement = Statement::new(INDEXES_SQL)
            .bind(vec![SqlValue::Text(table.to_string())])
            .uncapped();
        let mut rows = self.run(&statement)?.rows;
        for row in &mut rows {
            if let Some(flag) = row.get("unique").and_then(Value::as_i64) {
                row.insert("unique".to_string(), Value::Bool(flag != 0));
            }
            if let Some(flag) = row.get("partial").and_then(Value::as_i64) {
                row.insert("partial".to_string(), Value::Bool(flag != 0));
            }
        }
        Ok(rows)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Reads a text cell.
fn text(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Reads an integer cell.
fn integer(row: &Map<String, Value>, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Affinity;

    #[test]
    fn affinity_follows_sqlite_rules() {
        assert_eq!(Affinity::from_decl_type("INTEGER"), Affinity::Integer);
        assert_eq!(Affinity::from_decl_type("BIGINT"), Affinity::Integer);
        assert_eq!(Affinity::from_decl_type("VARCHAR(20)"), Affinity::Text);
        assert_eq!(Affinity::from_decl_type("clob"), Affinity::Text);
        assert_eq!(Affinity::from_decl_type(""), Affinity::Blob);
        assert_eq!(Affinity::from_decl_type("DOUBLE PRECISION"), Affinity::Real);
        assert_eq!(Affinity::from_decl_type("DECIMAL(10,2)"), Affinity::Numeric);
        assert_eq!(Affinity::from_decl_type("CHARINT"), Affinity::Integer);
        assert!(Affinity::from_decl_type("NUMERIC").is_numeric());
        assert!(!Affinity::from_decl_type("TEXT").is_numeric());
    }
}
