// sqlite-mcp/src/tools/tests.rs
// ============================================================================
// Module: Tool Router Unit Tests
// Description: Unit tests for argument decoding and error mapping.
// Purpose: Validate router behavior that needs no database file.
// Dependencies: sqlite-mcp
// ============================================================================

//! ## Overview
//! Covers the paths that fail before a database is resolved: unknown tools,
//! non-object arguments, schema violations, alias decoding, and kind mapping.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use serde_json::json;
use sqlite_mcp_store::ConnectionManager;
use sqlite_mcp_store::DbError;
use sqlite_mcp_store::ErrorKind;
use sqlite_mcp_store::ExecutorLimits;
use sqlite_mcp_store::PoolConfig;
use sqlite_mcp_store::QueryExecutor;

use super::ConnectRequest;
use super::ReadRequest;
use super::ToolError;
use super::ToolRouter;
use super::decode;

/// Builds a router with default limits and no default database.
fn router() -> ToolRouter {
    let manager = ConnectionManager::new(PoolConfig::default()).expect("manager");
    ToolRouter::new(QueryExecutor::new(manager, ExecutorLimits::default())).expect("router")
}

#[test]
fn unknown_tool_maps_to_method_not_found() {
    let err = router().handle_tool_call("drop_database", json!({})).unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "drop_database"));
    assert_eq!(err.kind(), ErrorKind::MethodNotFound);
}

#[test]
fn non_object_arguments_are_invalid() {
    let err = router().handle_tool_call("get_tables", json!([1, 2])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn schema_violations_are_reported_before_database_resolution() {
    let router = router();
    let err = router.handle_tool_call("query", json!({ "sql": "SELECT 1", "bogus": true })).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert!(err.to_string().contains("invalid arguments for query"));
    assert_eq!(router.manager().stats().acquisitions, 0);
}

#[test]
fn missing_default_database_is_invalid_parameters() {
    let err = router().handle_tool_call("get_tables", json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert!(err.to_string().contains("no default database"));
}

#[test]
fn wire_aliases_decode_into_canonical_fields() {
    let connect: ConnectRequest = decode(json!({ "db_path": "app.db" })).unwrap();
    assert_eq!(connect.path, "app.db");
    let read: ReadRequest =
        decode(json!({ "table": "users", "where": { "id": 1 }, "db_path": "app.db" })).unwrap();
    assert_eq!(read.filter.unwrap().get("id"), Some(&json!(1)));
    assert_eq!(read.path.as_deref(), Some("app.db"));
}

#[test]
fn store_errors_keep_their_kind_and_fragment() {
    let err = ToolError::from(DbError::execution_failed("no such table: ghosts", Some("SELECT * FROM ghosts")));
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(err.sql_fragment(), Some("SELECT * FROM ghosts"));
    assert_eq!(ToolError::Serialization.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(ToolError::from(DbError::Timeout("slow".to_string())).kind(), ErrorKind::Timeout);
}
