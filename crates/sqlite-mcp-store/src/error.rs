// sqlite-mcp-store/src/error.rs
// ============================================================================
// Module: Error Model
// Description: Typed error kinds shared by the store, tools, and dispatcher.
// Purpose: Classify every failure into one stable, protocol-visible kind.
// Dependencies: rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Every failure that can reach a caller is one of the [`ErrorKind`] values.
//! The store raises [`DbError`]; upper layers wrap it but never invent a new
//! kind. Driver errors are classified here so that no generic, unclassified
//! failure escapes the executor boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of characters of SQL echoed back in error payloads.
pub const MAX_SQL_FRAGMENT_CHARS: usize = 160;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Protocol-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments failed validation or binding.
    InvalidParameters,
    /// Unknown database, table, or column.
    NotFound,
    /// Connection pool exhausted.
    CapacityExceeded,
    /// Query deadline elapsed.
    Timeout,
    /// Request body exceeded the configured limit.
    RequestTooLarge,
    /// Unknown JSON-RPC method or tool.
    MethodNotFound,
    /// Driver-level SQL failure.
    ExecutionFailed,
    /// Path outside the allowed roots or a forbidden statement.
    PermissionDenied,
}

impl ErrorKind {
    /// Returns the stable label used in error payloads and audit events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameters => "invalid_parameters",
            Self::NotFound => "not_found",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Timeout => "timeout",
            Self::RequestTooLarge => "request_too_large",
            Self::MethodNotFound => "method_not_found",
            Self::ExecutionFailed => "execution_failed",
            Self::PermissionDenied => "permission_denied",
        }
    }

    /// Returns the JSON-RPC error code for this kind.
    #[must_use]
    pub const fn jsonrpc_code(self) -> i64 {
        match self {
            Self::InvalidParameters => -32602,
            Self::MethodNotFound => -32601,
            Self::NotFound => -32004,
            Self::PermissionDenied => -32003,
            Self::CapacityExceeded => -32010,
            Self::Timeout => -32011,
            Self::ExecutionFailed => -32030,
            Self::RequestTooLarge => -32070,
        }
    }
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors raised by path resolution, pooling, and query execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Invalid input detected before or during binding.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// Database, table, or column does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// No connection could be obtained in time.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// Statement exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Access denied by policy or by the filesystem.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Driver reported an error while running SQL.
    #[error("execution failed: {message}")]
    ExecutionFailed {
        /// Driver message.
        message: String,
        /// Sanitized SQL fragment, when a statement was involved.
        sql: Option<String>,
    },
}

impl DbError {
    /// Returns the protocol-visible kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ExecutionFailed {
                ..
            } => ErrorKind::ExecutionFailed,
        }
    }

    /// Returns the sanitized SQL fragment attached to the error, if any.
    #[must_use]
    pub fn sql_fragment(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailed {
                sql,
                ..
            } => sql.as_deref(),
            _ => None,
        }
    }

    /// Builds an execution failure with a sanitized copy of the SQL.
    #[must_use]
    pub fn execution_failed(message: impl Into<String>, sql: Option<&str>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            sql: sql.map(sanitize_sql_fragment),
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a driver error that was not caused by a deadline interrupt.
#[must_use]
pub fn classify_driver_error(err: &rusqlite::Error, sql: Option<&str>) -> DbError {
    match err {
        rusqlite::Error::MultipleStatement => {
            DbError::InvalidParameters("only one SQL statement is allowed per call".to_string())
        }
        rusqlite::Error::InvalidParameterCount(given, expected) => DbError::InvalidParameters(
            format!("statement expects {expected} parameters but {given} were bound"),
        ),
        rusqlite::Error::InvalidParameterName(name) => {
            DbError::InvalidParameters(format!("unknown parameter name: {name}"))
        }
        rusqlite::Error::SqliteFailure(failure, message) => {
            let detail = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::CannotOpen => DbError::NotFound(format!("database unavailable: {detail}")),
                ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::AuthorizationForStatementDenied => {
                    DbError::PermissionDenied(detail)
                }
                _ => DbError::execution_failed(detail, sql),
            }
        }
        other => DbError::execution_failed(other.to_string(), sql),
    }
}

/// Returns true when the driver error means the connection itself is damaged.
#[must_use]
pub fn is_connection_fatal(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            )
    )
}

/// Strips control characters and bounds the length of echoed SQL.
#[must_use]
pub fn sanitize_sql_fragment(sql: &str) -> String {
    let mut out = String::new();
    for (count, ch) in sql.trim().chars().enumerate() {
        if count == MAX_SQL_FRAGMENT_CHARS {
            out.push_str("...");
            break;
        }
        out.push(if ch.is_control() { ' ' } else { ch });
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
