// sqlite-mcp-store/tests/executor.rs
// ============================================================================
// Module: Query Executor Tests
// Description: Binding, row caps, deadlines, and error classification.
// Purpose: Ensure every statement outcome maps to the right result or kind.
// Dependencies: sqlite-mcp-store, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Runs real statements against temporary databases. Deadline tests use an
//! unbounded recursive CTE so the watchdog is the only way out.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use serde_json::json;
use sqlite_mcp_store::AccessMode;
use sqlite_mcp_store::DatabasePath;
use sqlite_mcp_store::DbError;
use sqlite_mcp_store::ErrorKind;
use sqlite_mcp_store::ExecutorLimits;
use sqlite_mcp_store::QueryExecutor;
use sqlite_mcp_store::QueryParams;
use sqlite_mcp_store::QueryRequest;
use sqlite_mcp_store::QueryResult;
use sqlite_mcp_store::SqlValue;
use sqlite_mcp_store::Statement;
use sqlite_mcp_store::StatementKind;

use crate::common::count_rows;
use crate::common::create_database;
use crate::common::executor;
use crate::common::manager;
use crate::common::seed_users;

/// Never-ending read used to trip the deadline.
const ENDLESS_READ: &str =
    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT max(x) FROM c";

/// Never-ending insert used to trip the deadline mid-write.
const ENDLESS_WRITE: &str = "INSERT INTO users (name) WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL \
                             SELECT x + 1 FROM c) SELECT 'bulk-' || x FROM c";

/// Runs a statement with a fresh deadline.
fn run(executor: &QueryExecutor, path: &DatabasePath, statement: Statement) -> Result<QueryResult, DbError> {
    executor.execute(&QueryRequest {
        database: path.clone(),
        statement,
        deadline: executor.deadline(),
    })
}

// ============================================================================
// SECTION: Reads
// ============================================================================

#[test]
fn select_returns_columns_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 2);
    let executor = executor(Duration::from_secs(5), 100);

    let result =
        run(&executor, &path, Statement::new("SELECT id, name, age FROM users ORDER BY id")).unwrap();
    assert_eq!(result.kind, StatementKind::Read);
    let names: Vec<&str> = result.columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "age"]);
    assert_eq!(result.columns[1].decl_type.as_deref(), Some("TEXT"));
    assert_eq!(result.row_count, 2);
    assert!(!result.truncated);
    assert_eq!(result.rows[0]["name"], json!("user-0"));
    assert_eq!(result.rows[1]["age"], json!(21));
    assert_eq!(result.rows_affected, None);
}

#[test]
fn rows_beyond_the_cap_set_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 5);
    let executor = executor(Duration::from_secs(5), 3);

    let result = run(&executor, &path, Statement::new("SELECT * FROM users")).unwrap();
    assert_eq!(result.row_count, 3);
    assert!(result.truncated);
}

#[test]
fn result_exactly_at_the_cap_is_not_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 3);
    let executor = executor(Duration::from_secs(5), 3);

    let result = run(&executor, &path, Statement::new("SELECT * FROM users")).unwrap();
    assert_eq!(result.row_count, 3);
    assert!(!result.truncated);
}

#[test]
fn statement_row_limit_applies_below_the_executor_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 5);
    let executor = executor(Duration::from_secs(5), 100);

    let result = run(&executor, &path, Statement::new("SELECT * FROM users").limit_rows(2)).unwrap();
    assert_eq!(result.row_count, 2);
    assert!(result.truncated);
}

#[test]
fn uncapped_statements_skip_the_executor_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 5);
    let executor = executor(Duration::from_secs(5), 2);

    let result = run(&executor, &path, Statement::new("SELECT * FROM users").uncapped()).unwrap();
    assert_eq!(result.row_count, 5);
    assert!(!result.truncated);

    let result =
        run(&executor, &path, Statement::new("SELECT * FROM users").limit_rows(3).uncapped()).unwrap();
    assert_eq!(result.row_count, 3);
    assert!(result.truncated);
}

#[test]
fn scalar_reads_the_first_cell() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 4);
    let executor = executor(Duration::from_secs(5), 100);

    let result = run(&executor, &path, Statement::new("SELECT COUNT(*) AS n FROM users")).unwrap();
    assert_eq!(result.scalar(), Some(&json!(4)));
}

// ============================================================================
// SECTION: Binding
// ============================================================================

#[test]
fn arity_mismatch_fails_before_acquiring_a_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let statement = Statement::new("SELECT * FROM users WHERE id = ? AND age > ?")
        .bind(vec![SqlValue::Integer(1)]);
    let err = run(&executor, &path, statement).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert_eq!(executor.manager().stats().acquisitions, 0);
}

#[test]
fn named_parameters_bind_with_or_without_sigil() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 3);
    let executor = executor(Duration::from_secs(5), 100);

    let mut values = BTreeMap::new();
    values.insert("age".to_string(), SqlValue::Integer(21));
    values.insert(":name".to_string(), SqlValue::Text("user-1".to_string()));
    let statement = Statement {
        sql: "SELECT id FROM users WHERE age = :age AND name = :name".to_string(),
        params: QueryParams::Named(values),
        row_limit: None,
        uncapped: false,
    };
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["id"], json!(2));
}

#[test]
fn unknown_named_parameter_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let mut values = BTreeMap::new();
    values.insert("nope".to_string(), SqlValue::Integer(1));
    let statement = Statement {
        sql: "SELECT id FROM users WHERE age = :age".to_string(),
        params: QueryParams::Named(values),
        row_limit: None,
        uncapped: false,
    };
    let err = run(&executor, &path, statement).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn blob_values_round_trip_as_base64_objects() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let statement = Statement::new("SELECT ? AS payload").bind(vec![SqlValue::Blob(vec![1, 2, 3])]);
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.rows[0]["payload"], json!({ "$blob": "AQID" }));
}

#[test]
fn placeholder_text_inside_literals_is_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 1);
    let executor = executor(Duration::from_secs(5), 100);

    let statement = Statement::new("SELECT '?' AS mark, ':skip' AS note, name FROM users WHERE id = ?")
        .bind(vec![SqlValue::Integer(1)]);
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.rows[0]["mark"], json!("?"));
}

// ============================================================================
// SECTION: Writes
// ============================================================================

#[test]
fn insert_reports_rows_affected_and_rowid() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let statement = Statement::new("INSERT INTO users (name, age) VALUES (?, ?)")
        .bind(vec![SqlValue::Text("ada".to_string()), SqlValue::Integer(36)]);
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.kind, StatementKind::Mutating);
    assert_eq!(result.rows_affected, Some(1));
    assert_eq!(result.last_insert_rowid, Some(1));
    assert_eq!(count_rows(path.as_path(), "users"), 1);
}

#[test]
fn update_matching_nothing_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 2);
    let executor = executor(Duration::from_secs(5), 100);

    let statement =
        Statement::new("UPDATE users SET age = 0 WHERE id = ?").bind(vec![SqlValue::Integer(99)]);
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.rows_affected, Some(0));
}

#[test]
fn mutating_statement_on_read_lease_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let mut lease = executor.manager().acquire(&path, AccessMode::Read).unwrap();
    let err = executor
        .execute_on(&mut lease, &Statement::new("DELETE FROM users"), executor.deadline())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn maintenance_pragmas_take_the_writer_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = QueryExecutor::new(manager(4, Duration::from_millis(200)), ExecutorLimits::default());

    let writer = executor.manager().acquire(&path, AccessMode::Write).unwrap();
    let err = run(&executor, &path, Statement::new("PRAGMA incremental_vacuum")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    let read = run(&executor, &path, Statement::new("PRAGMA freelist_count")).unwrap();
    assert_eq!(read.kind, StatementKind::Read);
    drop(writer);

    let result = run(&executor, &path, Statement::new("PRAGMA incremental_vacuum")).unwrap();
    assert_eq!(result.kind, StatementKind::Mutating);

    let mut reader = executor.manager().acquire(&path, AccessMode::Read).unwrap();
    let err = executor
        .execute_on(&mut reader, &Statement::new("PRAGMA optimize"), executor.deadline())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn failed_transaction_body_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 2);
    let executor = executor(Duration::from_secs(5), 100);

    let mut lease = executor.manager().acquire(&path, AccessMode::Write).unwrap();
    let deadline = executor.deadline();
    let err = executor
        .transaction(&mut lease, deadline, |exec, lease| {
            exec.execute_on(lease, &Statement::new("DELETE FROM users"), deadline)?;
            Err::<(), _>(DbError::InvalidParameters("abort".to_string()))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert!(lease.connection().unwrap().is_autocommit());
    drop(lease);
    assert_eq!(count_rows(path.as_path(), "users"), 2);
}

#[test]
fn committed_transaction_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 3);
    let executor = executor(Duration::from_secs(5), 100);

    let mut lease = executor.manager().acquire(&path, AccessMode::Write).unwrap();
    let deadline = executor.deadline();
    let affected = executor
        .transaction(&mut lease, deadline, |exec, lease| {
            let result = exec.execute_on(lease, &Statement::new("DELETE FROM users WHERE id > 1"), deadline)?;
            Ok(result.rows_affected)
        })
        .unwrap();
    drop(lease);
    assert_eq!(affected, Some(2));
    assert_eq!(count_rows(path.as_path(), "users"), 1);
}

// ============================================================================
// SECTION: Failures
// ============================================================================

#[test]
fn missing_table_fails_and_connection_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 1);
    let executor = executor(Duration::from_secs(5), 100);

    let err = run(&executor, &path, Statement::new("SELECT * FROM missing_table")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert!(err.to_string().contains("no such table"));
    assert_eq!(err.sql_fragment(), Some("SELECT * FROM missing_table"));

    let result = run(&executor, &path, Statement::new("SELECT COUNT(*) FROM users")).unwrap();
    assert_eq!(result.scalar(), Some(&json!(1)));
    let stats = executor.manager().stats();
    assert_eq!(stats.open_connections, 1);
    assert_eq!(stats.discarded, 0);
}

#[test]
fn multiple_statements_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let err = run(&executor, &path, Statement::new("SELECT 1; DELETE FROM users")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn constraint_violation_is_an_execution_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let err = run(&executor, &path, Statement::new("INSERT INTO users (name) VALUES (NULL)")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
}

#[test]
fn expired_deadline_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    let executor = executor(Duration::from_secs(5), 100);

    let err = executor
        .execute(&QueryRequest {
            database: path,
            statement: Statement::new("SELECT 1"),
            deadline: Instant::now(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

// ============================================================================
// SECTION: Deadlines
// ============================================================================

#[test]
fn slow_read_times_out_and_next_call_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 2);
    let executor = executor(Duration::from_millis(200), 100);

    let started = Instant::now();
    let err = run(&executor, &path, Statement::new(ENDLESS_READ)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));

    let result = run(&executor, &path, Statement::new("SELECT COUNT(*) FROM users")).unwrap();
    assert_eq!(result.scalar(), Some(&json!(2)));
}

#[test]
fn interrupted_write_leaves_no_rows_and_discards_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_database(&dir, "app.db");
    seed_users(path.as_path(), 2);
    let executor = executor(Duration::from_millis(200), 100);

    let err = run(&executor, &path, Statement::new(ENDLESS_WRITE)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(count_rows(path.as_path(), "users"), 2);
    assert_eq!(executor.manager().stats().discarded, 1);

    let statement = Statement::new("INSERT INTO users (name) VALUES (?)")
        .bind(vec![SqlValue::Text("after".to_string())]);
    let result = run(&executor, &path, statement).unwrap();
    assert_eq!(result.rows_affected, Some(1));
}
