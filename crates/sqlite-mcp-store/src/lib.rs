// sqlite-mcp-store/src/lib.rs
// ============================================================================
// Module: SQLite MCP Store
// Description: Connection pooling and bounded query execution for SQLite.
// Purpose: Give tool handlers safe, concurrent access to SQLite files.
// Dependencies: rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This crate owns every interaction with the database driver. Paths are
//! resolved through a [`DatabasePolicy`] into a canonical [`DatabasePath`],
//! connections are lent out by a bounded [`ConnectionManager`], and statements
//! run through the [`QueryExecutor`] under a deadline and a row cap. All
//! failures are reported as [`DbError`] values carrying an [`ErrorKind`].
//! Security posture: SQL text and database paths are untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod executor;
pub mod path;
pub mod pool;
pub mod sql;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::DbError;
pub use error::ErrorKind;
pub use executor::ColumnMeta;
pub use executor::ExecutorLimits;
pub use executor::QueryExecutor;
pub use executor::QueryParams;
pub use executor::QueryRequest;
pub use executor::QueryResult;
pub use executor::Statement;
pub use path::DatabasePath;
pub use path::DatabasePolicy;
pub use path::MissingDatabasePolicy;
pub use pool::AccessMode;
pub use pool::ConnectionLease;
pub use pool::ConnectionManager;
pub use pool::PoolConfig;
pub use pool::PoolStats;
pub use pool::SqliteJournalMode;
pub use pool::SqliteSyncMode;
pub use sql::StatementKind;
pub use value::SqlValue;
