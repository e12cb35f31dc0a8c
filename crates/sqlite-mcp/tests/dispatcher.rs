// sqlite-mcp/tests/dispatcher.rs
// ============================================================================
// Module: Dispatcher Tests
// Description: JSON-RPC envelopes around real tool calls.
// Purpose: Validate result wrapping and error encoding through the dispatcher.
// Dependencies: sqlite-mcp, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Drives [`sqlite_mcp::Dispatcher`] with `tools/call` and direct tool
//! methods against a seeded database.

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

use serde_json::Value;
use serde_json::json;

use crate::common::arg;
use crate::common::call_tool;
use crate::common::dispatcher;
use crate::common::shop_database;

#[test]
fn tools_call_wraps_payload_as_text_and_structured_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = shop_database(&dir, 2);
    let dispatcher = dispatcher(100, 64 * 1024);

    let body = call_tool(&dispatcher, 1, "get_tables", &json!({ "path": arg(&path) }));
    let result = &body["result"];
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["content"][0]["type"], json!("text"));
    let text = result["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed, result["structuredContent"]);
    assert_eq!(parsed["count"], json!(3));
}

#[test]
fn tool_failures_become_json_rpc_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = shop_database(&dir, 0);
    let dispatcher = dispatcher(100, 64 * 1024);

    let missing = call_tool(&dispatcher, 2, "get_schema", &json!({ "table": "ghosts", "path": arg(&path) }));
    assert_eq!(missing["id"], json!(2));
    assert!(missing.get("result").is_none());
    assert_eq!(missing["error"]["code"], json!(-32004));
    assert_eq!(missing["error"]["data"]["kind"], json!("not_found"));

    let failed = call_tool(&dispatcher, 3, "query", &json!({ "sql": "SELECT nope FROM customers", "path": arg(&path) }));
    assert_eq!(failed["error"]["code"], json!(-32030));
    assert_eq!(failed["error"]["data"]["kind"], json!("execution_failed"));
    assert!(failed["error"]["data"]["sql"].as_str().unwrap().contains("nope"));

    let unknown = call_tool(&dispatcher, 4, "drop_everything", &json!({}));
    assert_eq!(unknown["error"]["code"], json!(-32601));
}

#[test]
fn direct_tool_methods_return_raw_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = shop_database(&dir, 3);
    let dispatcher = dispatcher(100, 64 * 1024);
    let request = json!({
        "jsonrpc": "2.0",
        "id": "direct",
        "method": "read",
        "params": { "table": "customers", "limit": 2, "path": arg(&path) },
    });
    let response = dispatcher.handle(&serde_json::to_vec(&request).unwrap(), None);
    assert_eq!(response.body["id"], json!("direct"));
    assert_eq!(response.body["result"]["row_count"], json!(2));
    assert_eq!(response.body["result"]["truncated"], json!(true));
}

#[test]
fn connect_then_call_without_path_uses_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = shop_database(&dir, 1);
    let dispatcher = dispatcher(100, 64 * 1024);

    let connected = call_tool(&dispatcher, 1, "connect_database", &json!({ "path": arg(&path) }));
    assert_eq!(connected["result"]["structuredContent"]["success"], json!(true));
    let analysis = call_tool(&dispatcher, 2, "analyze_table", &json!({ "table": "customers" }));
    assert_eq!(analysis["result"]["structuredContent"]["row_count"], json!(1));
}

#[test]
fn oversized_tool_call_is_rejected_with_request_too_large() {
    let dispatcher = dispatcher(100, 128);
    let padding = "x".repeat(512);
    let body = call_tool(&dispatcher, 1, "query", &json!({ "sql": format!("SELECT '{padding}'") }));
    assert_eq!(body["error"]["code"], json!(-32070));
    assert_eq!(body["error"]["data"]["kind"], json!("request_too_large"));
    assert_eq!(dispatcher.router().manager().stats().acquisitions, 0);
}
