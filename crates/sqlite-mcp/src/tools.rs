// sqlite-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool routing and handlers for SQLite operations.
// Purpose: Turn validated tool arguments into bounded executor calls.
// Dependencies: sqlite-mcp-store, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! The tool router validates arguments against the catalog schema, decodes
//! them into typed requests, resolves the target database, and runs the
//! handler on one lease with one deadline.
//! Security posture: tool inputs are untrusted.
//!
//! ## Invariants
//! - Arity, guard, and filter checks run before any connection is acquired.
//! - Identifiers reach SQL only after matching the live schema, quoted.
//! - Mutating tools report exact affected rows or an error.
//! - The only state kept across calls is the default database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use sqlite_mcp_store::AccessMode;
use sqlite_mcp_store::ConnectionManager;
use sqlite_mcp_store::DatabasePath;
use sqlite_mcp_store::DbError;
use sqlite_mcp_store::ErrorKind;
use sqlite_mcp_store::QueryExecutor;
use sqlite_mcp_store::QueryParams;
use sqlite_mcp_store::SqlValue;
use sqlite_mcp_store::Statement;
use sqlite_mcp_store::StatementKind;
use sqlite_mcp_store::sql::PlaceholderSet;
use sqlite_mcp_store::sql::check_statement_guard;
use sqlite_mcp_store::sql::quote_identifier;
use thiserror::Error;

use crate::catalog::RegistryError;
use crate::catalog::ToolCatalog;
use crate::catalog::ToolDefinition;
use crate::catalog::ToolName;
use crate::filters::Condition;
use crate::filters::escape_like;
use crate::filters::parse_filter;
use crate::filters::parse_order_by;
use crate::filters::render_order_by;
use crate::filters::render_where;
use crate::schema::SchemaSession;
use crate::schema::TableKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tables listed in a `connect_database` response.
const CONNECT_TABLE_PREVIEW: usize = 10;

/// Rows returned by `analyze_table` as a sample.
const ANALYZE_SAMPLE_ROWS: usize = 5;

/// Default per-table row limit for `search_data`.
const DEFAULT_SEARCH_LIMIT_PER_TABLE: usize = 10;

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Shared router state.
    state: Arc<RouterState>,
}

/// State shared by router clones.
struct RouterState {
    /// Executor over the shared connection manager.
    executor: QueryExecutor,
    /// Tool definitions and compiled validators.
    catalog: ToolCatalog,
    /// Database used when a call names none.
    default_database: RwLock<Option<DatabasePath>>,
}

impl ToolRouter {
    /// Creates a router over an executor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the tool catalog fails to build.
    pub fn new(executor: QueryExecutor) -> Result<Self, RegistryError> {
        Ok(Self {
            state: Arc::new(RouterState {
                executor,
                catalog: ToolCatalog::new()?,
                default_database: RwLock::new(None),
            }),
        })
    }

    /// Lists the tools available to callers.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.state.catalog.definitions().to_vec()
    }

    /// Returns the executor used by every handler.
    #[must_use]
    pub fn executor(&self) -> &QueryExecutor {
        &self.state.executor
    }

    /// Returns the shared connection manager.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        self.state.executor.manager()
    }

    /// Returns the current default database.
    #[must_use]
    pub fn default_database(&self) -> Option<DatabasePath> {
        self.state.default_database.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the default database.
    pub fn set_default_database(&self, database: DatabasePath) {
        *self.state.default_database.write().unwrap_or_else(PoisonError::into_inner) =
            Some(database);
    }

    /// Routes a tool call by name with JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for unknown tools, invalid arguments, or any
    /// store failure.
    pub fn handle_tool_call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            object @ Value::Object(_) => object,
            _ => {
                return Err(ToolError::InvalidParams(format!(
                    "arguments for {tool} must be an object"
                )));
            }
        };
        let violations = self.state.catalog.violations(tool, &arguments);
        if !violations.is_empty() {
            return Err(ToolError::InvalidParams(format!(
                "invalid arguments for {tool}: {}",
                violations.join("; ")
            )));
        }
        match tool {
            ToolName::ConnectDatabase => self.connect_database(decode(arguments)?),
            ToolName::Query => self.query(decode(arguments)?),
            ToolName::GetTables => self.get_tables(decode(arguments)?),
            ToolName::GetSchema => self.get_schema(decode(arguments)?),
            ToolName::Create => self.create(decode(arguments)?),
            ToolName::Read => self.read(decode(arguments)?),
            ToolName::Update => self.update(decode(arguments)?),
            ToolName::Delete => self.delete(decode(arguments)?),
            ToolName::AnalyzeTable => self.analyze_table(decode(arguments)?),
            ToolName::SearchData => self.search_data(decode(arguments)?),
        }
    }

    /// Resolves the `path` argument or falls back to the default database.
    fn resolve_database(&self, path: Option<&str>) -> Result<DatabasePath, ToolError> {
        match path {
            Some(raw) => Ok(self.manager().resolve(raw)?),
            None => self.default_database().ok_or_else(|| {
                ToolError::InvalidParams(
                    "no database path given and no default database is connected".to_string(),
                )
            }),
        }
    }

    /// Opens a session on the resolved database.
    fn session(
        &self,
        path: Option<&str>,
        mode: AccessMode,
    ) -> Result<SchemaSession<'_>, ToolError> {
        let database = self.resolve_database(path)?;
        Ok(SchemaSession::open(self.executor(), &database, mode)?)
    }
}

// ============================================================================
// SECTION: Request Types
// ============================================================================

/// `connect_database` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectRequest {
    /// Database file to open.
    #[serde(alias = "db_path")]
    path: String,
}

/// `query` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryToolRequest {
    /// SQL statement.
    sql: String,
    /// Positional or named parameters.
    #[serde(default)]
    params: Option<Value>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// Arguments naming only a database.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseRequest {
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// Arguments naming one table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableRequest {
    /// Table name.
    table: String,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// `create` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateRequest {
    /// Table name.
    table: String,
    /// Column values for the new row.
    #[serde(alias = "data")]
    values: Map<String, Value>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// `read` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadRequest {
    /// Table name.
    table: String,
    /// Row filter.
    #[serde(default, alias = "where")]
    filter: Option<Map<String, Value>>,
    /// Sort order.
    #[serde(default)]
    order_by: Option<Value>,
    /// Maximum rows, clamped to the executor cap.
    #[serde(default)]
    limit: Option<u64>,
    /// Rows to skip.
    #[serde(default)]
    offset: Option<u64>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// `update` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateRequest {
    /// Table name.
    table: String,
    /// Column values to assign.
    #[serde(alias = "data")]
    values: Map<String, Value>,
    /// Row filter.
    #[serde(default, alias = "where")]
    filter: Option<Map<String, Value>>,
    /// Permits an empty filter.
    #[serde(default)]
    affect_all: bool,
    /// Rolls back when more rows would change.
    #[serde(default)]
    max_affected: Option<u64>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// `delete` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteRequest {
    /// Table name.
    table: String,
    /// Row filter.
    #[serde(default, alias = "where")]
    filter: Option<Map<String, Value>>,
    /// Permits an empty filter.
    #[serde(default)]
    affect_all: bool,
    /// Rolls back when more rows would change.
    #[serde(default)]
    max_affected: Option<u64>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

/// Text matching mode for `search_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MatchMode {
    /// Substring match with `LIKE`.
    #[default]
    Contains,
    /// Whole-value equality.
    Exact,
}

impl MatchMode {
    /// Returns the stable label.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Exact => "exact",
        }
    }
}

/// `search_data` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchRequest {
    /// Term to look for.
    search_term: String,
    /// Tables to search; all tables when absent.
    #[serde(default)]
    tables: Option<Vec<String>>,
    /// Matching mode.
    #[serde(default)]
    match_mode: MatchMode,
    /// Row limit per table.
    #[serde(default)]
    limit_per_table: Option<u64>,
    /// Optional database override.
    #[serde(default, alias = "db_path")]
    path: Option<String>,
}

// ============================================================================
// SECTION: Catalog Tools
// ============================================================================

impl ToolRouter {
    /// Opens a database, lists its tables, and makes it the default.
    fn connect_database(&self, request: ConnectRequest) -> Result<Value, ToolError> {
        let database = self.manager().resolve(&request.path)?;
        let tables: Vec<String> = {
            let mut session = SchemaSession::open(self.executor(), &database, AccessMode::Read)?;
            session
                .tables()?
                .iter()
                .filter(|entry| entry.kind == TableKind::Table)
                .map(|entry| entry.name.clone())
                .collect()
        };
        self.set_default_database(database.clone());
        tracing::info!(database = %database, tables = tables.len(), "default database connected");
        Ok(json!({
            "success": true,
            "message": format!("Connected to database: {database}"),
            "handle": database.to_string_lossy(),
            "database_path": database.to_string_lossy(),
            "tables_found": tables.len(),
            "tables": tables.iter().take(CONNECT_TABLE_PREVIEW).collect::<Vec<_>>(),
        }))
    }

    /// Lists tables and views.
    fn get_tables(&self, request: DatabaseRequest) -> Result<Value, ToolError> {
        let mut session = self.session(request.path.as_deref(), AccessMode::Read)?;
        let tables: Vec<Value> = session
            .tables()?
            .iter()
            .map(|entry| {
                json!({
                    "name": entry.name,
                    "type": entry.kind.as_str(),
                    "sql": entry.sql,
                })
            })
            .collect();
        Ok(json!({ "count": tables.len(), "tables": tables }))
    }

    /// Describes columns, foreign keys, and indexes of one table.
    fn get_schema(&self, request: TableRequest) -> Result<Value, ToolError> {
        let mut session = self.session(request.path.as_deref(), AccessMode::Read)?;
        let table = session.resolve_table(&request.table)?;
        let columns: Vec<Value> = session
            .columns(&table)?
            .iter()
            .map(|column| {
                json!({
                    "cid": column.cid,
                    "name": column.name,
                    "type": column.decl_type,
                    "notnull": column.notnull,
                    "default_value": column.default_value,
                    "pk": column.pk,
                })
            })
            .collect();
        let foreign_keys = session.foreign_keys(&table)?;
        let indexes = session.indexes(&table)?;
        Ok(json!({
            "table": table,
            "columns": columns,
            "foreign_keys": foreign_keys,
            "indexes": indexes,
        }))
    }
}

// ============================================================================
// SECTION: Query Tool
// ============================================================================

impl ToolRouter {
    /// Runs one caller-supplied statement.
    fn query(&self, request: QueryToolRequest) -> Result<Value, ToolError> {
        check_statement_guard(&request.sql)?;
        let kind = StatementKind::classify(&request.sql)?;
        let params = QueryParams::from_json(request.params.as_ref())?;
        params.check(&PlaceholderSet::scan(&request.sql)?)?;

        let mode = if kind.is_read() { AccessMode::Read } else { AccessMode::Write };
        let mut session = self.session(request.path.as_deref(), mode)?;
        let statement = Statement {
            sql: request.sql,
            params,
            row_limit: None,
            uncapped: false,
        };
        let result = session.run(&statement)?;
        let columns: Vec<&str> = result.columns.iter().map(|column| column.name.as_str()).collect();
        if kind.is_read() {
            return Ok(json!({
                "columns": columns,
                "rows": result.rows,
                "row_count": result.row_count,
                "truncated": result.truncated,
                "execution_time_ms": result.elapsed_ms,
            }));
        }
        let mut document = json!({
            "rows_affected": result.rows_affected.unwrap_or(0),
            "last_insert_rowid": result.last_insert_rowid,
            "execution_time_ms": result.elapsed_ms,
        });
        // RETURNING clauses produce result columns on a mutating statement.
        if !columns.is_empty()
            && let Some(object) = document.as_object_mut()
        {
            object.insert("columns".to_string(), json!(columns));
            object.insert("row_count".to_string(), json!(result.row_count));
            object.insert("truncated".to_string(), json!(result.truncated));
            let rows = result.rows.into_iter().map(Value::Object).collect();
            object.insert("rows".to_string(), Value::Array(rows));
        }
        Ok(document)
    }
}

// ============================================================================
// SECTION: Row Tools
// ============================================================================

impl ToolRouter {
    /// Inserts one row.
    fn create(&self, request: CreateRequest) -> Result<Value, ToolError> {
        if request.values.is_empty() {
            return Err(ToolError::InvalidParams("values must name at least one column".to_string()));
        }
        let values = request
            .values
            .iter()
            .map(|(column, value)| Ok::<_, DbError>((column.clone(), SqlValue::from_json(value)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        let mut session = self.session(request.path.as_deref(), AccessMode::Write)?;
        let table = session.resolve_table(&request.table)?;
        let mut columns = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(quote_identifier(&session.resolve_column(&table, &column)?));
            params.push(value);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&table),
            columns.join(", "),
            vec!["?"; params.len()].join(", ")
        );
        let result = session.run(&Statement::new(sql).bind(params))?;
        Ok(json!({
            "inserted_id": result.last_insert_rowid,
            "rows_affected": result.rows_affected.unwrap_or(0),
        }))
    }

    /// Reads rows with filtering, ordering, and a clamped limit.
    fn read(&self, request: ReadRequest) -> Result<Value, ToolError> {
        let mut conditions = parse_filter(request.filter.as_ref())?;
        let mut order = parse_order_by(request.order_by.as_ref())?;
        let offset = i64::try_from(request.offset.unwrap_or(0))
            .map_err(|_| ToolError::InvalidParams("offset is too large".to_string()))?;

        let mut session = self.session(request.path.as_deref(), AccessMode::Read)?;
        let max_rows = session.max_result_rows();
        let limit = request
            .limit
            .map_or(max_rows, |limit| usize::try_from(limit).unwrap_or(usize::MAX).min(max_rows));
        let table = session.resolve_table(&request.table)?;
        resolve_conditions(&mut session, &table, &mut conditions)?;
        for term in &mut order {
            term.column = session.resolve_column(&table, &term.column)?;
        }

        let clause = render_where(&conditions);
        let sql = format!(
            "SELECT * FROM {}{}{} LIMIT ? OFFSET ?",
            quote_identifier(&table),
            clause.sql,
            render_order_by(&order)
        );
        let mut params = clause.params;
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX).saturating_add(1)));
        params.push(SqlValue::Integer(offset));
        let result = session.run(&Statement::new(sql).bind(params).limit_rows(limit))?;
        Ok(json!({
            "table": table,
            "rows": result.rows,
            "row_count": result.row_count,
            "truncated": result.truncated,
            "limit": limit,
            "offset": offset,
        }))
    }

    /// Updates rows inside one transaction.
    fn update(&self, request: UpdateRequest) -> Result<Value, ToolError> {
        let mut conditions = parse_filter(request.filter.as_ref())?;
        require_filter(ToolName::Update, &conditions, request.affect_all)?;
        if request.values.is_empty() {
            return Err(ToolError::InvalidParams("values must name at least one column".to_string()));
        }
        let values = request
            .values
            .iter()
            .map(|(column, value)| Ok::<_, DbError>((column.clone(), SqlValue::from_json(value)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        let mut session = self.session(request.path.as_deref(), AccessMode::Write)?;
        let table = session.resolve_table(&request.table)?;
        let mut assignments = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (column, value) in values {
            let column = session.resolve_column(&table, &column)?;
            assignments.push(format!("{} = ?", quote_identifier(&column)));
            params.push(value);
        }
        resolve_conditions(&mut session, &table, &mut conditions)?;
        let clause = render_where(&conditions);
        params.extend(clause.params);
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_identifier(&table),
            assignments.join(", "),
            clause.sql
        );
        let rows_affected = run_bounded(&mut session, Statement::new(sql).bind(params), request.max_affected)?;
        Ok(json!({ "rows_affected": rows_affected }))
    }

    /// Deletes rows inside one transaction.
    fn delete(&self, request: DeleteRequest) -> Result<Value, ToolError> {
        let mut conditions = parse_filter(request.filter.as_ref())?;
        require_filter(ToolName::Delete, &conditions, request.affect_all)?;

        let mut session = self.session(request.path.as_deref(), AccessMode::Write)?;
        let table = session.resolve_table(&request.table)?;
        resolve_conditions(&mut session, &table, &mut conditions)?;
        let clause = render_where(&conditions);
        let sql = format!("DELETE FROM {}{}", quote_identifier(&table), clause.sql);
        let rows_affected =
            run_bounded(&mut session, Statement::new(sql).bind(clause.params), request.max_affected)?;
        Ok(json!({ "rows_affected": rows_affected }))
    }
}

/// Rejects unfiltered mutations unless explicitly allowed.
fn require_filter(tool: ToolName, conditions: &[Condition], affect_all: bool) -> Result<(), ToolError> {
    if conditions.is_empty() && !affect_all {
        return Err(ToolError::InvalidParams(format!(
            "{tool} requires a non-empty filter or affect_all=true"
        )));
    }
    Ok(())
}

/// Replaces condition columns with their catalog spelling.
fn resolve_conditions(
    session: &mut SchemaSession<'_>,
    table: &str,
    conditions: &mut [Condition],
) -> Result<(), DbError> {
    for condition in conditions {
        condition.column = session.resolve_column(table, &condition.column)?;
    }
    Ok(())
}

/// Runs a mutating statement in a transaction, rolling back past `max_affected`.
fn run_bounded(
    session: &mut SchemaSession<'_>,
    statement: Statement,
    max_affected: Option<u64>,
) -> Result<u64, DbError> {
    session.transaction(|executor, lease, deadline| {
        let result = executor.execute_on(lease, &statement, deadline)?;
        let affected = result.rows_affected.unwrap_or(0);
        if let Some(max) = max_affected
            && affected > max
        {
            return Err(DbError::InvalidParameters(format!(
                "statement would change {affected} rows, above max_affected={max}; rolled back"
            )));
        }
        Ok(affected)
    })
}

// ============================================================================
// SECTION: Analysis Tools
// ============================================================================

impl ToolRouter {
    /// Computes per-column statistics and a row sample.
    fn analyze_table(&self, request: TableRequest) -> Result<Value, ToolError> {
        let mut session = self.session(request.path.as_deref(), AccessMode::Read)?;
        let table = session.resolve_table(&request.table)?;
        let quoted_table = quote_identifier(&table);
        let row_count = session
            .run(&Statement::new(format!("SELECT COUNT(*) AS row_count FROM {quoted_table}")))?
            .scalar()
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let columns = session.columns(&table)?.to_vec();
        let mut stats = Vec::with_capacity(columns.len());
        for column in &columns {
            let quoted = quote_identifier(&column.name);
            let numeric = column.affinity().is_numeric();
            let sql = if numeric {
                format!(
                    "SELECT COUNT(*) - COUNT({quoted}) AS null_count, COUNT(DISTINCT {quoted}) AS \
                     distinct_count, MIN({quoted}) AS min, MAX({quoted}) AS max, AVG({quoted}) AS \
                     avg FROM {quoted_table}"
                )
            } else {
                format!(
                    "SELECT COUNT(*) - COUNT({quoted}) AS null_count, COUNT(DISTINCT {quoted}) AS \
                     distinct_count FROM {quoted_table}"
                )
            };
            let result = session.run(&Statement::new(sql))?;
            let mut entry = Map::new();
            entry.insert("name".to_string(), json!(column.name));
            entry.insert("type".to_string(), json!(column.decl_type));
            entry.insert("affinity".to_string(), json!(column.affinity().as_str()));
            if let Some(row) = result.rows.into_iter().next() {
                entry.extend(row);
            }
            stats.push(Value::Object(entry));
        }

        let sample = session.run(
            &Statement::new(format!("SELECT * FROM {quoted_table} LIMIT {ANALYZE_SAMPLE_ROWS}"))
                .limit_rows(ANALYZE_SAMPLE_ROWS),
        )?;
        Ok(json!({
            "table": table,
            "row_count": row_count,
            "columns": stats,
            "sample_rows": sample.rows,
        }))
    }

    /// Searches text columns of the selected tables.
    ///
    /// Each table is queried once with the columns OR-ed together, so a row
    /// matching in several columns is reported once under its first match.
    fn search_data(&self, request: SearchRequest) -> Result<Value, ToolError> {
        let limit_per_table = request
            .limit_per_table
            .map_or(DEFAULT_SEARCH_LIMIT_PER_TABLE, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        let (operator, needle) = match request.match_mode {
            MatchMode::Contains => {
                ("LIKE ?1 ESCAPE '\\'", SqlValue::Text(format!("%{}%", escape_like(&request.search_term))))
            }
            MatchMode::Exact => ("= ?1", SqlValue::Text(request.search_term.clone())),
        };

        let mut session = self.session(request.path.as_deref(), AccessMode::Read)?;
        let cap = session.max_result_rows();
        let targets: Vec<String> = match &request.tables {
            Some(names) => {
                names.iter().map(|name| session.resolve_table(name)).collect::<Result<_, _>>()?
            }
            None => session
                .tables()?
                .iter()
                .filter(|entry| entry.kind == TableKind::Table)
                .map(|entry| entry.name.clone())
                .collect(),
        };

        let mut results = Vec::new();
        let mut truncated = false;
        let mut tables_searched = 0_usize;
        for table in &targets {
            tables_searched += 1;
            let columns = session.columns(table)?;
            let all_columns: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();
            let searchable: Vec<String> = columns
                .iter()
                .filter(|column| column.is_searchable())
                .map(|column| column.name.clone())
                .collect();
            if searchable.is_empty() {
                continue;
            }
            // A zero take still reads one row to learn whether the global
            // cap cut this table off.
            let take = limit_per_table.min(cap.saturating_sub(results.len()));
            let marker = unused_column_name(&all_columns, "_search_match");
            let predicates: Vec<String> = searchable
                .iter()
                .map(|column| format!("{} {operator}", quote_identifier(column)))
                .collect();
            let first_match: String = predicates
                .iter()
                .enumerate()
                .map(|(index, predicate)| format!(" WHEN {predicate} THEN {index}"))
                .collect();
            let sql = format!(
                "SELECT *, CASE{first_match} END AS {} FROM {} WHERE {} LIMIT ?2",
                quote_identifier(&marker),
                quote_identifier(table),
                predicates.join(" OR ")
            );
            let sql_limit = i64::try_from(take).unwrap_or(i64::MAX).saturating_add(1);
            let statement = Statement::new(sql)
                .bind(vec![needle.clone(), SqlValue::Integer(sql_limit)])
                .limit_rows(take);
            let found = session.run(&statement)?;
            for mut row in found.rows {
                let column = row
                    .remove(&marker)
                    .as_ref()
                    .and_then(Value::as_u64)
                    .and_then(|index| usize::try_from(index).ok())
                    .and_then(|index| searchable.get(index));
                results.push(json!({ "table": table, "column": column, "row": row }));
            }
            if found.truncated && take < limit_per_table {
                truncated = true;
                break;
            }
        }

        Ok(json!({
            "search_term": request.search_term,
            "match_mode": request.match_mode.as_str(),
            "matches_found": results.len(),
            "tables_searched": tables_searched,
            "truncated": truncated,
            "results": results,
        }))
    }
}

/// Returns `base`, extended with underscores until no column uses it.
fn unused_column_name(columns: &[String], base: &str) -> String {
    let mut name = base.to_string();
    while columns.iter().any(|column| column.eq_ignore_ascii_case(&name)) {
        name.push('_');
    }
    name
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool routing errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not recognized.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// JSON-RPC method not recognized.
    #[error("method not found: {0}")]
    UnknownMethod(String),
    /// Arguments failed schema validation or decoding.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Store failure with its own kind.
    #[error(transparent)]
    Store(#[from] DbError),
    /// Result payload could not be serialized.
    #[error("serialization failure")]
    Serialization,
    /// Unexpected fault inside a handler.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Returns the protocol-visible kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) | Self::UnknownMethod(_) => ErrorKind::MethodNotFound,
            Self::InvalidParams(_) => ErrorKind::InvalidParameters,
            Self::Store(err) => err.kind(),
            Self::Serialization | Self::Internal(_) => ErrorKind::ExecutionFailed,
        }
    }

    /// Returns the sanitized SQL fragment attached to a driver failure.
    #[must_use]
    pub fn sql_fragment(&self) -> Option<&str> {
        match self {
            Self::Store(err) => err.sql_fragment(),
            _ => None,
        }
    }
}

/// Decodes a JSON value into a typed request payload.
fn decode<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, ToolError> {
    serde_json::from_value(payload).map_err(|err| ToolError::InvalidParams(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
