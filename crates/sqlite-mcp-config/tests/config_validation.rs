//! Config validation tests for sqlite-mcp-config.
// crates/sqlite-mcp-config/tests/config_validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate config loading guards and range checks.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use sqlite_mcp_config::ConfigError;
use sqlite_mcp_config::LogFormat;
use sqlite_mcp_config::SqliteMcpConfig;
use sqlite_mcp_store::MissingDatabasePolicy;
use sqlite_mcp_store::SqliteJournalMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

/// Asserts that a config result is an error mentioning `needle`.
fn assert_invalid(result: Result<SqliteMcpConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

/// Writes TOML to a temp file.
fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_reads_every_section() -> TestResult {
    let file = write_config(
        r#"
[server]
host = "0.0.0.0"
port = 8080
log_level = "debug"
log_format = "json"

[limits]
max_connections = 4
max_query_time_secs = 5
max_result_rows = 50

[database]
default_path = "/srv/data/app.db"
allowed_roots = ["/srv/data"]
missing = "create_if_missing"
journal_mode = "delete"

[audit]
enabled = true
path = "/var/log/sqlite-mcp/audit.jsonl"
"#,
    )?;
    let config = SqliteMcpConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.server.port != 8080 || config.server.log_format != LogFormat::Json {
        return Err("server section not applied".to_string());
    }
    if config.limits.max_connections != 4 || config.limits.max_result_rows != 50 {
        return Err("limits section not applied".to_string());
    }
    if config.database.missing != MissingDatabasePolicy::CreateIfMissing
        || config.database.journal_mode != SqliteJournalMode::Delete
    {
        return Err("database section not applied".to_string());
    }
    if !config.audit.enabled {
        return Err("audit section not applied".to_string());
    }
    if config.source.as_deref() != Some(file.path()) {
        return Err("source path not recorded".to_string());
    }
    let addr = config.server.bind_addr().map_err(|err| err.to_string())?;
    if addr.port() != 8080 || !addr.ip().is_unspecified() {
        return Err(format!("unexpected bind address {addr}"));
    }
    Ok(())
}

#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let missing = dir.path().join("absent.toml");
    assert_invalid(SqliteMcpConfig::load(Some(&missing)), "config io error")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        SqliteMcpConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(SqliteMcpConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(SqliteMcpConfig::load(Some(file.path())), "config file must be utf-8")
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    assert_invalid(SqliteMcpConfig::parse("[server]\nbogus = 1\n"), "config parse error")?;
    assert_invalid(SqliteMcpConfig::parse("[extras]\n"), "config parse error")
}

#[test]
fn zero_connections_are_rejected() -> TestResult {
    assert_invalid(
        SqliteMcpConfig::parse("[limits]\nmax_connections = 0\n"),
        "limits.max_connections",
    )
}

#[test]
fn oversized_limits_are_rejected() -> TestResult {
    assert_invalid(
        SqliteMcpConfig::parse("[limits]\nmax_query_time_secs = 3601\n"),
        "limits.max_query_time_secs",
    )?;
    assert_invalid(
        SqliteMcpConfig::parse("[limits]\nmax_result_rows = 1000001\n"),
        "limits.max_result_rows",
    )
}

#[test]
fn invalid_host_is_rejected() -> TestResult {
    assert_invalid(SqliteMcpConfig::parse("[server]\nhost = \"not a host\"\n"), "server.host")
}

#[test]
fn localhost_binds_loopback() -> TestResult {
    let config =
        SqliteMcpConfig::parse("[server]\nhost = \"localhost\"\n").map_err(|err| err.to_string())?;
    let addr = config.server.bind_addr().map_err(|err| err.to_string())?;
    if addr.ip().is_loopback() { Ok(()) } else { Err(format!("expected loopback, got {addr}")) }
}

#[test]
fn invalid_log_level_is_rejected() -> TestResult {
    assert_invalid(SqliteMcpConfig::parse("[server]\nlog_level = \"loud\"\n"), "server.log_level")
}

#[test]
fn unknown_missing_policy_is_rejected() -> TestResult {
    assert_invalid(SqliteMcpConfig::parse("[database]\nmissing = \"sometimes\"\n"), "config parse error")
}

#[test]
fn dotted_extension_is_rejected() -> TestResult {
    assert_invalid(
        SqliteMcpConfig::parse("[database]\nallowed_extensions = [\".db\"]\n"),
        "database.allowed_extensions",
    )
}

#[test]
fn empty_audit_path_is_rejected() -> TestResult {
    assert_invalid(SqliteMcpConfig::parse("[audit]\npath = \"  \"\n"), "audit.path must be non-empty")
}
