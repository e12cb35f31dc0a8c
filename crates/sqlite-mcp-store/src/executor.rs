// sqlite-mcp-store/src/executor.rs
// ============================================================================
// Module: Query Executor
// Description: Deadline- and row-limited execution of single SQL statements.
// Purpose: Run parameterized SQL and classify every outcome.
// Dependencies: rusqlite, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`QueryExecutor`] runs exactly one statement per call on a leased
//! connection.
//!
//! Guarantees:
//! - Parameters are bound through the driver, never spliced into SQL.
//! - Arity is checked against the scanned placeholders before a connection is
//!   acquired.
//! - A watchdog interrupts the statement once its deadline passes, and the
//!   interrupted call reports [`DbError::Timeout`]. A connection that might
//!   carry a half-finished write is discarded.
//! - Results stop at the row cap with `truncated` set. Truncation is a
//!   success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::InterruptHandle;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::DbError;
use crate::error::classify_driver_error;
use crate::error::is_connection_fatal;
use crate::path::DatabasePath;
use crate::pool::AccessMode;
use crate::pool::ConnectionLease;
use crate::pool::ConnectionManager;
use crate::sql::PlaceholderSet;
use crate::sql::StatementKind;
use crate::sql::strip_sigil;
use crate::value::SqlValue;
use crate::value::value_ref_to_json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default statement deadline.
pub const DEFAULT_MAX_QUERY_TIME: Duration = Duration::from_secs(60);
/// Default row cap for a single statement.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Limits applied to every statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    /// Wall-clock budget for one invocation.
    pub max_query_time: Duration,
    /// Maximum rows returned by one statement.
    pub max_result_rows: usize,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            max_query_time: DEFAULT_MAX_QUERY_TIME,
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }
}

/// Bound parameter values.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParams {
    /// Values bound by position.
    Positional(Vec<SqlValue>),
    /// Values bound by placeholder name (sigil optional).
    Named(BTreeMap<String, SqlValue>),
}

impl Default for QueryParams {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl QueryParams {
    /// Converts a JSON `params` argument (array, object, or absent).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] for scalars or values that cannot
    /// be bound.
    pub fn from_json(value: Option<&Value>) -> Result<Self, DbError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Array(items)) => {
                items.iter().map(SqlValue::from_json).collect::<Result<Vec<_>, _>>().map(Self::Positional)
            }
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| Ok::<_, DbError>((key.clone(), SqlValue::from_json(value)?)))
                .collect::<Result<BTreeMap<_, _>, DbError>>()
                .map(Self::Named),
            Some(_) => Err(DbError::InvalidParameters(
                "params must be an array or an object".to_string(),
            )),
        }
    }

    /// Returns the number of supplied values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    /// Returns true when no values are supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks the supplied values against scanned placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] on any arity or name mismatch.
    pub fn check(&self, placeholders: &PlaceholderSet) -> Result<(), DbError> {
        match self {
            Self::Positional(values) => placeholders.check_positional(values.len()),
            Self::Named(values) => placeholders.check_named(values.keys().map(String::as_str)),
        }
    }
}

/// One SQL statement with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with placeholders.
    pub sql: String,
    /// Values for the placeholders.
    pub params: QueryParams,
    /// Optional row cap below the executor limit.
    pub row_limit: Option<usize>,
    /// Skips the executor row cap. Reserved for catalog reads issued by the
    /// server itself, never for caller SQL.
    pub uncapped: bool,
}

impl Statement {
    /// Creates a statement with no parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: QueryParams::default(),
            row_limit: None,
            uncapped: false,
        }
    }

    /// Binds positional values.
    #[must_use]
    pub fn bind(mut self, values: Vec<SqlValue>) -> Self {
        self.params = QueryParams::Positional(values);
        self
    }

    /// Sets a row cap for this statement.
    #[must_use]
    pub fn limit_rows(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Lifts the executor row cap for an internal catalog read.
    #[must_use]
    pub fn uncapped(mut self) -> Self {
        self.uncapped = true;
        self
    }

    /// Returns the row cap in effect under `max_result_rows`.
    #[must_use]
    pub fn effective_row_cap(&self, max_result_rows: usize) -> usize {
        match (self.row_limit, self.uncapped) {
            (Some(limit), true) => limit,
            (Some(limit), false) => limit.min(max_result_rows),
            (None, true) => usize::MAX,
            (None, false) => max_result_rows,
        }
    }
}

/// Statement addressed to a database with a deadline.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Target database.
    pub database: DatabasePath,
    /// Statement to run.
    pub statement: Statement,
    /// Wall-clock deadline.
    pub deadline: Instant,
}

/// Result column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    /// Column name as reported by the driver.
    pub name: String,
    /// Declared column type, when the column maps to a table column.
    pub decl_type: Option<String>,
}

/// Successful statement outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Read or mutating classification.
    #[serde(skip)]
    pub kind: StatementKind,
    /// Result columns.
    pub columns: Vec<ColumnMeta>,
    /// Result rows keyed by column name.
    pub rows: Vec<Map<String, Value>>,
    /// Number of rows returned.
    pub row_count: usize,
    /// True when more rows existed beyond the cap.
    pub truncated: bool,
    /// Rows changed by a mutating statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Last inserted rowid after a mutating statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_rowid: Option<i64>,
    /// Wall-clock execution time.
    pub elapsed_ms: u64,
}

impl QueryResult {
    /// Returns the first column of the first row.
    #[must_use]
    pub fn scalar(&self) -> Option<&Value> {
        let row = self.rows.first()?;
        let column = self.columns.first()?;
        row.get(&column.name)
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Runs statements against connections from a [`ConnectionManager`].
#[derive(Clone)]
pub struct QueryExecutor {
    /// Connection source.
    manager: ConnectionManager,
    /// Deadline and row limits.
    limits: ExecutorLimits,
}

impl QueryExecutor {
    /// Creates an executor over a manager.
    #[must_use]
    pub const fn new(manager: ConnectionManager, limits: ExecutorLimits) -> Self {
        Self {
            manager,
            limits,
        }
    }

    /// Returns the connection manager.
    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn limits(&self) -> ExecutorLimits {
        self.limits
    }

    /// Returns a deadline one `max_query_time` from now.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.limits.max_query_time
    }

    /// Acquires a connection, runs one statement, and releases it.
    ///
    /// Classification and arity checks happen before any connection is
    /// acquired.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for invalid binding, capacity, timeout, or driver
    /// failures.
    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResult, DbError> {
        let kind = StatementKind::classify(&request.statement.sql)?;
        request.statement.params.check(&PlaceholderSet::scan(&request.statement.sql)?)?;
        let mode = if kind.is_read() { AccessMode::Read } else { AccessMode::Write };
        let mut lease = self.manager.acquire(&request.database, mode)?;
        self.execute_on(&mut lease, &request.statement, request.deadline)
    }

    /// Runs one statement on an already acquired lease.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for invalid binding, timeout, or driver failures.
    /// Mutating statements on a read lease are rejected.
    pub fn execute_on(
        &self,
        lease: &mut ConnectionLease,
        statement: &Statement,
        deadline: Instant,
    ) -> Result<QueryResult, DbError> {
        let kind = StatementKind::classify(&statement.sql)?;
        if !kind.is_read() && lease.mode() == AccessMode::Read {
            return Err(DbError::InvalidParameters(
                "mutating statement issued on a read-only connection".to_string(),
            ));
        }
        statement.params.check(&PlaceholderSet::scan(&statement.sql)?)?;
        if Instant::now() >= deadline {
            return Err(DbError::Timeout("query deadline elapsed before execution".to_string()));
        }
        let row_cap = statement.effective_row_cap(self.limits.max_result_rows);

        let (outcome, fired) = {
            let connection = lease.connection()?;
            let watchdog = Watchdog::arm(connection.get_interrupt_handle(), deadline);
            let outcome = run_statement(connection, statement, kind, row_cap);
            (outcome, watchdog.disarm())
        };

        match outcome {
            Ok(result) => {
                lease.record_success();
                Ok(result)
            }
            Err(RunError::Invalid(err)) => Err(err),
            Err(RunError::Driver(err)) => {
                let interrupted = matches!(
                    &err,
                    rusqlite::Error::SqliteFailure(failure, _)
                        if failure.code == ErrorCode::OperationInterrupted
                );
                if interrupted && fired {
                    recover_after_interrupt(lease, kind);
                    tracing::warn!(
                        database = %lease.path(),
                        discarded = !lease.is_healthy(),
                        "statement interrupted at deadline"
                    );
                    return Err(DbError::Timeout(format!(
                        "query exceeded the {} ms time limit",
                        self.limits.max_query_time.as_millis()
                    )));
                }
                if is_connection_fatal(&err) {
                    lease.mark_unhealthy();
                } else {
                    lease.record_failure();
                }
                Err(classify_driver_error(&err, Some(&statement.sql)))
            }
        }
    }

    /// Runs `body` inside `BEGIN IMMEDIATE` / `COMMIT` on a write lease.
    ///
    /// Any error from `body` or from `COMMIT` rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the error from `body`, or a driver error from the transaction
    /// control statements.
    pub fn transaction<T>(
        &self,
        lease: &mut ConnectionLease,
        deadline: Instant,
        body: impl FnOnce(&Self, &mut ConnectionLease) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        if lease.mode() != AccessMode::Write {
            return Err(DbError::InvalidParameters(
                "transactions require a write connection".to_string(),
            ));
        }
        if Instant::now() >= deadline {
            return Err(DbError::Timeout("query deadline elapsed before execution".to_string()));
        }
        run_control(lease, "BEGIN IMMEDIATE")?;
        let outcome = body(self, lease).and_then(|value| run_control(lease, "COMMIT").map(|()| value));
        if outcome.is_err() {
            rollback(lease);
        }
        outcome
    }
}

// ============================================================================
// SECTION: Statement Execution
// ============================================================================

/// Failure while running a statement.
enum RunError {
    /// Binding mismatch detected locally.
    Invalid(DbError),
    /// Driver failure to classify.
    Driver(rusqlite::Error),
}

impl From<rusqlite::Error> for RunError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Driver(err)
    }
}

/// Prepares, binds, and steps one statement.
fn run_statement(
    connection: &Connection,
    statement: &Statement,
    kind: StatementKind,
    row_cap: usize,
) -> Result<QueryResult, RunError> {
    let started = Instant::now();
    let changes_before = connection.total_changes();
    let mut prepared = connection.prepare(&statement.sql)?;
    bind_parameters(&mut prepared, &statement.params)?;
    let columns: Vec<ColumnMeta> = prepared
        .columns()
        .iter()
        .map(|column| ColumnMeta {
            name: column.name().to_string(),
            decl_type: column.decl_type().map(str::to_string),
        })
        .collect();

    let mut rows_out = Vec::new();
    let mut truncated = false;
    {
        let mut rows = prepared.raw_query();
        while let Some(row) = rows.next()? {
            if rows_out.len() == row_cap {
                truncated = true;
                break;
            }
            let mut record = Map::new();
            for (index, column) in columns.iter().enumerate() {
                record.insert(column.name.clone(), value_ref_to_json(row.get_ref(index)?));
            }
            rows_out.push(record);
        }
    }
    drop(prepared);

    let (rows_affected, last_insert_rowid) = if kind.is_read() {
        (None, None)
    } else if connection.total_changes() == changes_before {
        (Some(0), None)
    } else {
        (
            Some(u64::try_from(connection.changes()).unwrap_or(u64::MAX)),
            Some(connection.last_insert_rowid()),
        )
    };
    let row_count = rows_out.len();
    Ok(QueryResult {
        kind,
        columns,
        rows: rows_out,
        row_count,
        truncated,
        rows_affected,
        last_insert_rowid,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Binds values, re-checking arity against the driver's placeholder count.
fn bind_parameters(prepared: &mut rusqlite::Statement<'_>, params: &QueryParams) -> Result<(), RunError> {
    let expected = prepared.parameter_count();
    if params.len() != expected {
        return Err(RunError::Invalid(DbError::InvalidParameters(format!(
            "statement has {expected} placeholder(s) but {} parameter(s) were supplied",
            params.len()
        ))));
    }
    match params {
        QueryParams::Positional(values) => {
            for (offset, value) in values.iter().enumerate() {
                prepared.raw_bind_parameter(offset + 1, value)?;
            }
        }
        QueryParams::Named(values) => {
            for (name, value) in values {
                let index = named_index(prepared, name)?.ok_or_else(|| {
                    RunError::Invalid(DbError::InvalidParameters(format!(
                        "no placeholder named {} in statement",
                        strip_sigil(name)
                    )))
                })?;
                prepared.raw_bind_parameter(index, value)?;
            }
        }
    }
    Ok(())
}

/// Looks up a named placeholder, trying each sigil when none is given.
fn named_index(prepared: &rusqlite::Statement<'_>, name: &str) -> rusqlite::Result<Option<usize>> {
    if name.starts_with([':', '@', '$']) {
        return prepared.parameter_index(name);
    }
    for sigil in [':', '@', '$'] {
        if let Some(index) = prepared.parameter_index(&format!("{sigil}{name}"))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Runs a transaction control statement.
fn run_control(lease: &mut ConnectionLease, sql: &str) -> Result<(), DbError> {
    let result = lease.connection()?.execute_batch(sql);
    result.map_err(|err| {
        if is_connection_fatal(&err) {
            lease.mark_unhealthy();
        }
        classify_driver_error(&err, Some(sql))
    })
}

/// Rolls back an open transaction, discarding the connection if that fails.
fn rollback(lease: &mut ConnectionLease) {
    let clean = lease
        .connection()
        .is_ok_and(|connection| connection.is_autocommit() || connection.execute_batch("ROLLBACK").is_ok());
    if !clean {
        lease.mark_unhealthy();
    }
}

/// Restores a connection after a deadline interrupt.
///
/// Writes are never trusted after an interrupt, so their connection is
/// discarded even when the rollback succeeds.
fn recover_after_interrupt(lease: &mut ConnectionLease, kind: StatementKind) {
    rollback(lease);
    if !kind.is_read() {
        lease.mark_unhealthy();
    }
}

// ============================================================================
// SECTION: Watchdog
// ============================================================================

/// Interrupts a connection when a deadline passes.
struct Watchdog {
    /// Dropping the sender wakes the watchdog thread early.
    cancel: Option<mpsc::Sender<()>>,
    /// Watchdog thread.
    handle: Option<JoinHandle<()>>,
    /// Set when the interrupt was issued.
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    /// Starts a watchdog thread for `deadline`.
    fn arm(interrupt: InterruptHandle, deadline: Instant) -> Self {
        let (cancel, wait) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = thread::Builder::new()
            .name("sqlite-mcp-deadline".to_string())
            .spawn(move || {
                let budget = deadline.saturating_duration_since(Instant::now());
                if matches!(wait.recv_timeout(budget), Err(mpsc::RecvTimeoutError::Timeout)) {
                    flag.store(true, Ordering::SeqCst);
                    interrupt.interrupt();
                }
            })
            .map_err(|err| tracing::warn!(error = %err, "failed to start deadline watchdog"))
            .ok();
        Self {
            cancel: Some(cancel),
            handle,
            fired,
        }
    }

    /// Stops the watchdog and reports whether it fired.
    fn disarm(mut self) -> bool {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.fired.load(Ordering::SeqCst)
    }
}
