// sqlite-mcp/src/lib.rs
// ============================================================================
// Module: SQLite MCP Library
// Description: Tool registry, JSON-RPC dispatcher, and HTTP server.
// Purpose: Expose SQLite databases as JSON-RPC tools over HTTP.
// Dependencies: sqlite-mcp-store, sqlite-mcp-config, axum, jsonschema, tokio
// ============================================================================

//! ## Overview
//! `sqlite-mcp` turns the store crate into a tool-calling server. The
//! [`catalog`] module owns the static tool definitions and their compiled
//! input schemas, [`tools::ToolRouter`] turns validated arguments into
//! executor calls, and [`server`] decodes JSON-RPC envelopes and hosts the
//! axum transport.
//! Security posture: request bodies, tool arguments, and SQL text are
//! untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod filters;
pub mod logging;
pub mod schema;
pub mod server;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpFileAuditSink;
pub use audit::McpNoopAuditSink;
pub use audit::McpStderrAuditSink;
pub use catalog::RegistryError;
pub use catalog::ToolCatalog;
pub use catalog::ToolDefinition;
pub use catalog::ToolName;
pub use logging::init_logging;
pub use server::DispatchResponse;
pub use server::Dispatcher;
pub use server::McpServer;
pub use server::McpServerError;
pub use telemetry::ServerStats;
pub use telemetry::StatsSnapshot;
pub use tools::ToolError;
pub use tools::ToolRouter;
