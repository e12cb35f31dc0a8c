// sqlite-mcp-config/src/lib.rs
// ============================================================================
// Module: SQLite MCP Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for sqlite-mcp.toml semantics.
// Dependencies: sqlite-mcp-store, serde, toml
// ============================================================================

//! ## Overview
//! `sqlite-mcp-config` defines the configuration model for the SQLite MCP
//! server. It provides strict, fail-closed validation and converts the
//! validated model into the store's pool and executor settings.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
