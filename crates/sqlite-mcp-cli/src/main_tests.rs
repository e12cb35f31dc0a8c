// crates/sqlite-mcp-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for flag overrides and config checks.
// Purpose: Ensure flags win over file values and invalid values fail closed.
// Dependencies: sqlite-mcp-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Exercises `load_config` and `apply_overrides` with temporary config files.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use sqlite_mcp_config::LogFormat;
use sqlite_mcp_store::MissingDatabasePolicy;

use super::Cli;
use super::LogFormatArg;
use super::config_summary;
use super::load_config;

/// Writes a config file into `dir` and returns its path.
fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("sqlite-mcp.toml");
    fs::write(&path, body).unwrap();
    path
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn flags_override_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server]\nport = 7000\n\n[limits]\nmax_result_rows = 50\n");
    let cli = Cli {
        config: Some(path.clone()),
        port: Some(7100),
        log_format: Some(LogFormatArg::Json),
        max_connections: Some(4),
        database: Some("app.db".to_string()),
        create_missing: true,
        ..Cli::default()
    };
    let config = load_config(&cli).unwrap();
    assert_eq!(config.server.port, 7100);
    assert_eq!(config.server.log_format, LogFormat::Json);
    assert_eq!(config.limits.max_result_rows, 50);
    assert_eq!(config.limits.max_connections, 4);
    assert_eq!(config.database.default_path.as_deref(), Some("app.db"));
    assert_eq!(config.database.missing, MissingDatabasePolicy::CreateIfMissing);
    assert_eq!(config.source.as_deref(), Some(path.as_path()));
}

#[test]
fn out_of_range_flag_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "");
    let cli = Cli {
        config: Some(path),
        max_connections: Some(0),
        ..Cli::default()
    };
    let err = load_config(&cli).unwrap_err();
    assert!(err.to_string().contains("invalid configuration"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli {
        config: Some(dir.path().join("absent.toml")),
        ..Cli::default()
    };
    assert!(load_config(&cli).unwrap_err().to_string().contains("failed to load config"));
}

#[test]
fn summary_names_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server]\nhost = \"127.0.0.1\"\nport = 9100\n");
    let cli = Cli {
        config: Some(path),
        ..Cli::default()
    };
    let summary = config_summary(&load_config(&cli).unwrap());
    assert!(summary.starts_with("configuration ok"));
    assert!(summary.contains("sqlite-mcp.toml"));
    assert!(summary.contains("127.0.0.1:9100"));
}

#[test]
fn parser_accepts_every_flag() {
    let cli = Cli::try_parse_from([
        "sqlite-mcp",
        "--config",
        "cfg.toml",
        "--host",
        "0.0.0.0",
        "--port",
        "8080",
        "--log-level",
        "debug",
        "--log-format",
        "compact",
        "--max-connections",
        "3",
        "--max-query-time",
        "5",
        "--max-result-rows",
        "10",
        "--database",
        "data.sqlite",
        "--create-missing",
        "--check-config",
    ])
    .unwrap();
    assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
    assert_eq!(cli.log_format, Some(LogFormatArg::Compact));
    assert_eq!(cli.max_query_time, Some(5));
    assert!(cli.create_missing);
    assert!(cli.check_config);
}
