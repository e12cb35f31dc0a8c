// sqlite-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared router, dispatcher, and database fixtures.
// Purpose: Give every test its own database file and pool.
// Dependencies: sqlite-mcp, sqlite-mcp-store, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Builds seeded SQLite files in a temporary directory and wires routers
//! and dispatchers over fresh connection managers.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde_json::Value;
use serde_json::json;
use sqlite_mcp::Dispatcher;
use sqlite_mcp::McpNoopAuditSink;
use sqlite_mcp::ToolRouter;
use sqlite_mcp_store::ConnectionManager;
use sqlite_mcp_store::ExecutorLimits;
use sqlite_mcp_store::PoolConfig;
use sqlite_mcp_store::QueryExecutor;
use tempfile::TempDir;

// ============================================================================
// SECTION: Databases
// ============================================================================

/// Schema for the tool tests.
pub const SHOP_SCHEMA: &str = "
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE,
    city TEXT
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL REFERENCES customers(id),
    total REAL NOT NULL,
    note TEXT
);
CREATE INDEX orders_customer ON orders(customer_id);
CREATE TABLE counters (
    id INTEGER PRIMARY KEY,
    value INTEGER NOT NULL
);
INSERT INTO counters (id, value) VALUES (1, 0);
";

/// Creates a database with the shop schema and `customers` seeded rows.
pub fn shop_database(dir: &TempDir, customers: usize) -> PathBuf {
    let path = dir.path().join("shop.db");
    let connection = Connection::open(&path).unwrap();
    connection.execute_batch(SHOP_SCHEMA).unwrap();
    for index in 0 .. customers {
        let city = if index % 2 == 0 { "Lisbon" } else { "Porto" };
        connection
            .execute(
                "INSERT INTO customers (name, email, city) VALUES (?1, ?2, ?3)",
                (format!("customer-{index}"), format!("c{index}@example.com"), city),
            )
            .unwrap();
    }
    path
}

/// Counts rows through a separate driver connection.
pub fn count_rows(path: &Path, table: &str) -> i64 {
    let connection = Connection::open(path).unwrap();
    connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)).unwrap()
}

/// Returns the path as a tool argument string.
pub fn arg(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

// ============================================================================
// SECTION: Routers
// ============================================================================

/// Builds a router with the given row cap.
pub fn router(max_result_rows: usize) -> ToolRouter {
    let manager = ConnectionManager::new(PoolConfig::default()).unwrap();
    let limits = ExecutorLimits {
        max_result_rows,
        ..ExecutorLimits::default()
    };
    ToolRouter::new(QueryExecutor::new(manager, limits)).unwrap()
}

/// Builds a dispatcher over a fresh router.
pub fn dispatcher(max_result_rows: usize, max_body_bytes: usize) -> Dispatcher {
    Dispatcher::new(router(max_result_rows), max_body_bytes, Arc::new(McpNoopAuditSink))
}

/// Dispatches a `tools/call` request and returns the JSON body.
pub fn call_tool(dispatcher: &Dispatcher, id: i64, name: &str, arguments: &Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments },
    });
    let bytes = serde_json::to_vec(&request).unwrap();
    dispatcher.handle(&bytes, None).body
}
