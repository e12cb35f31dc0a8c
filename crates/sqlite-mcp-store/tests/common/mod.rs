// sqlite-mcp-store/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared database fixtures for store tests.
// Purpose: Build isolated databases, managers, and executors per test.
// Dependencies: sqlite-mcp-store, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Every test gets its own temporary directory and its own
//! [`ConnectionManager`], so no pool state leaks between tests.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use sqlite_mcp_store::ConnectionManager;
use sqlite_mcp_store::DatabasePath;
use sqlite_mcp_store::DatabasePolicy;
use sqlite_mcp_store::ExecutorLimits;
use sqlite_mcp_store::PoolConfig;
use sqlite_mcp_store::QueryExecutor;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Schema used by most store tests.
pub const USERS_SCHEMA: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE,
    age INTEGER
);";

/// Creates a database file with the users schema and returns its path.
pub fn create_database(dir: &TempDir, name: &str) -> DatabasePath {
    let path = dir.path().join(name);
    let connection = Connection::open(&path).unwrap();
    connection.execute_batch(USERS_SCHEMA).unwrap();
    drop(connection);
    DatabasePolicy::default().resolve(path.to_str().unwrap()).unwrap()
}

/// Inserts `count` users named `user-N`.
pub fn seed_users(path: &Path, count: usize) {
    let connection = Connection::open(path).unwrap();
    for index in 0 .. count {
        connection
            .execute(
                "INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)",
                (format!("user-{index}"), format!("user{index}@example.com"), 20 + i64::try_from(index).unwrap()),
            )
            .unwrap();
    }
}

/// Counts rows in a table through a fresh driver connection.
pub fn count_rows(path: &Path, table: &str) -> i64 {
    let connection = Connection::open(path).unwrap();
    connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)).unwrap()
}

/// Builds a manager with a custom size and acquire timeout.
pub fn manager(max_connections: usize, acquire_timeout: Duration) -> ConnectionManager {
    ConnectionManager::new(PoolConfig {
        max_connections,
        acquire_timeout,
        ..PoolConfig::default()
    })
    .unwrap()
}

/// Builds an executor with custom limits over a fresh manager.
pub fn executor(max_query_time: Duration, max_result_rows: usize) -> QueryExecutor {
    QueryExecutor::new(
        manager(4, Duration::from_secs(2)),
        ExecutorLimits {
            max_query_time,
            max_result_rows,
        },
    )
}
