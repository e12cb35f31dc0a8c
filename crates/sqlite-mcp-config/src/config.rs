// sqlite-mcp-config/src/config.rs
// ============================================================================
// Module: SQLite MCP Configuration
// Description: Configuration loading and validation for the SQLite MCP server.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sqlite-mcp-store, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown fields and out-of-range values fail closed. When no file is named
//! and the default file is absent, built-in defaults apply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use sqlite_mcp_store::DatabasePolicy;
use sqlite_mcp_store::ExecutorLimits;
use sqlite_mcp_store::MissingDatabasePolicy;
use sqlite_mcp_store::PoolConfig;
use sqlite_mcp_store::SqliteJournalMode;
use sqlite_mcp_store::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "sqlite-mcp.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SQLITE_MCP_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for `max_connections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 1024;
/// Upper bound for `max_query_time_secs`.
pub const MAX_QUERY_TIME_LIMIT_SECS: u64 = 3600;
/// Upper bound for `max_result_rows`.
pub const MAX_RESULT_ROWS_LIMIT: usize = 1_000_000;
/// Upper bound for millisecond timeouts.
const MAX_TIMEOUT_MS: u64 = 600_000;
/// Upper bound for `max_body_bytes`.
const MAX_BODY_BYTES_LIMIT: usize = 100 * 1024 * 1024;
/// Upper bound for `max_connection_failures`.
const MAX_CONNECTION_FAILURES_LIMIT: u32 = 100;
/// Maximum number of allowed roots or extensions.
const MAX_POLICY_ENTRIES: usize = 64;
/// Accepted log levels.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// SQLite MCP server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteMcpConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Execution limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Database admission and connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Path the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl SqliteMcpConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// An explicit path or the environment override must exist. The default
    /// file is optional; defaults apply when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(resolved) = resolve_path(path)? else {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        };
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.source = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.limits.validate()?;
        self.database.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Builds the connection manager settings.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.limits.max_connections,
            acquire_timeout: Duration::from_millis(self.limits.acquire_timeout_ms),
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            journal_mode: self.database.journal_mode,
            sync_mode: self.database.sync_mode,
            max_connection_failures: self.limits.max_connection_failures,
            policy: self.database_policy(),
        }
    }

    /// Builds the path admission policy.
    #[must_use]
    pub fn database_policy(&self) -> DatabasePolicy {
        DatabasePolicy {
            allowed_roots: self.database.allowed_roots.iter().map(PathBuf::from).collect(),
            allowed_extensions: self
                .database
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim().to_ascii_lowercase())
                .collect(),
            missing: self.database.missing,
        }
    }

    /// Builds the executor limits.
    #[must_use]
    pub const fn executor_limits(&self) -> ExecutorLimits {
        ExecutorLimits {
            max_query_time: Duration::from_secs(self.limits.max_query_time_secs),
            max_result_rows: self.limits.max_result_rows,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind host (IP address or `localhost`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.trim().to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "server.log_level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the host is not an IP address or
    /// `localhost`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim();
        let ip = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse::<IpAddr>()
                .map_err(|_| ConfigError::Invalid(format!("invalid server.host: {host}")))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// JSON lines.
    Json,
}

/// Execution limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum open connections across all databases.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Wall-clock budget for one tool invocation, in seconds.
    #[serde(default = "default_max_query_time_secs")]
    pub max_query_time_secs: u64,
    /// Maximum rows returned by one statement.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
    /// Maximum wait for a connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Consecutive failures before a connection is discarded.
    #[serde(default = "default_max_connection_failures")]
    pub max_connection_failures: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_query_time_secs: default_max_query_time_secs(),
            max_result_rows: default_max_result_rows(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            max_connection_failures: default_max_connection_failures(),
        }
    }
}

impl LimitsConfig {
    /// Validates limit ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1 ..= MAX_CONNECTIONS_LIMIT).contains(&self.max_connections) {
            return Err(ConfigError::Invalid(format!(
                "limits.max_connections must be between 1 and {MAX_CONNECTIONS_LIMIT}"
            )));
        }
        if !(1 ..= MAX_QUERY_TIME_LIMIT_SECS).contains(&self.max_query_time_secs) {
            return Err(ConfigError::Invalid(format!(
                "limits.max_query_time_secs must be between 1 and {MAX_QUERY_TIME_LIMIT_SECS}"
            )));
        }
        if !(1 ..= MAX_RESULT_ROWS_LIMIT).contains(&self.max_result_rows) {
            return Err(ConfigError::Invalid(format!(
                "limits.max_result_rows must be between 1 and {MAX_RESULT_ROWS_LIMIT}"
            )));
        }
        if !(1 ..= MAX_TIMEOUT_MS).contains(&self.acquire_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "limits.acquire_timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"
            )));
        }
        if !(1 ..= MAX_CONNECTION_FAILURES_LIMIT).contains(&self.max_connection_failures) {
            return Err(ConfigError::Invalid(format!(
                "limits.max_connection_failures must be between 1 and \
                 {MAX_CONNECTION_FAILURES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Database admission and connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database used when a tool call names none.
    #[serde(default)]
    pub default_path: Option<String>,
    /// Directories databases must live under (empty allows any).
    #[serde(default)]
    pub allowed_roots: Vec<String>,
    /// Admitted file extensions without the dot (empty allows any).
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Behavior for missing database files.
    #[serde(default)]
    pub missing: MissingDatabasePolicy,
    /// Driver busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode for new connections.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// Sync mode for new connections.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_path: None,
            allowed_roots: Vec::new(),
            allowed_extensions: default_allowed_extensions(),
            missing: MissingDatabasePolicy::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl DatabaseConfig {
    /// Validates database settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.default_path {
            validate_path_string("database.default_path", path)?;
        }
        if self.allowed_roots.len() > MAX_POLICY_ENTRIES {
            return Err(ConfigError::Invalid("too many database.allowed_roots".to_string()));
        }
        for root in &self.allowed_roots {
            validate_path_string("database.allowed_roots", root)?;
        }
        if self.allowed_extensions.len() > MAX_POLICY_ENTRIES {
            return Err(ConfigError::Invalid("too many database.allowed_extensions".to_string()));
        }
        for ext in &self.allowed_extensions {
            let trimmed = ext.trim();
            if trimmed.is_empty()
                || !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
            {
                return Err(ConfigError::Invalid(format!(
                    "database.allowed_extensions entry is invalid: {ext:?}"
                )));
            }
        }
        if self.busy_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "database.busy_timeout_ms must be at most {MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Enable structured audit logging.
    #[serde(default)]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI, environment, or the default file.
///
/// Returns `None` when nothing was named and the default file is absent.
fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default.is_file().then_some(default))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default bind host.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default bind port.
const fn default_port() -> u16 {
    9999
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

/// Default connection limit.
const fn default_max_connections() -> usize {
    sqlite_mcp_store::pool::DEFAULT_MAX_CONNECTIONS
}

/// Default per-invocation time budget.
const fn default_max_query_time_secs() -> u64 {
    sqlite_mcp_store::executor::DEFAULT_MAX_QUERY_TIME.as_secs()
}

/// Default row cap.
const fn default_max_result_rows() -> usize {
    sqlite_mcp_store::executor::DEFAULT_MAX_RESULT_ROWS
}

/// Default acquire timeout.
const fn default_acquire_timeout_ms() -> u64 {
    5_000
}

/// Default failure budget.
const fn default_max_connection_failures() -> u32 {
    sqlite_mcp_store::pool::DEFAULT_MAX_CONNECTION_FAILURES
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Default admitted extensions.
fn default_allowed_extensions() -> Vec<String> {
    sqlite_mcp_store::path::DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
