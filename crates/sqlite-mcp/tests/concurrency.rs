// sqlite-mcp/tests/concurrency.rs
// ============================================================================
// Module: Concurrency Tests
// Description: Parallel tool calls sharing one pool.
// Purpose: Ensure concurrent writers never lose updates.
// Dependencies: sqlite-mcp, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Several threads increment the same counter through the `query` tool and
//! read through `read`; the final value must equal the number of updates.

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

use std::thread;

use serde_json::json;

use crate::common::arg;
use crate::common::router;
use crate::common::shop_database;

/// Worker threads.
const THREADS: usize = 8;

/// Increments per thread.
const UPDATES_PER_THREAD: usize = 25;

#[test]
fn concurrent_increments_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let path = shop_database(&dir, 4);
    let router = router(100);
    let database = arg(&path);

    thread::scope(|scope| {
        for _ in 0 .. THREADS {
            let router = router.clone();
            let database = database.clone();
            scope.spawn(move || {
                for _ in 0 .. UPDATES_PER_THREAD {
                    let result = router
                        .handle_tool_call(
                            "query",
                            json!({
                                "sql": "UPDATE counters SET value = value + 1 WHERE id = ?",
                                "params": [1],
                                "path": database,
                            }),
                        )
                        .unwrap();
                    assert_eq!(result["rows_affected"], json!(1));
                    let read = router
                        .handle_tool_call("read", json!({ "table": "customers", "path": database }))
                        .unwrap();
                    assert_eq!(read["row_count"], json!(4));
                }
            });
        }
    });

    let counter = router
        .handle_tool_call("read", json!({ "table": "counters", "filter": { "id": 1 }, "path": database }))
        .unwrap();
    let expected = THREADS * UPDATES_PER_THREAD;
    assert_eq!(counter["rows"][0]["value"], json!(expected));
    let stats = router.manager().stats();
    assert!(stats.open_connections <= stats.max_connections);
}
