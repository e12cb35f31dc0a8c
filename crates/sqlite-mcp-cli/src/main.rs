// crates/sqlite-mcp-cli/src/main.rs
// ============================================================================
// Module: SQLite MCP CLI Entry Point
// Description: Flag parsing, configuration overrides, and server startup.
// Purpose: Run the SQLite MCP server from the command line.
// Dependencies: clap, sqlite-mcp, sqlite-mcp-config, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! Loads the TOML configuration, applies command-line overrides, and serves
//! until Ctrl-C or SIGTERM. `--check-config` validates and exits without
//! binding. Security posture: flags and config files are untrusted input and
//! are validated before any socket or database is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;
use sqlite_mcp::McpServer;
use sqlite_mcp::init_logging;
use sqlite_mcp_config::LogFormat;
use sqlite_mcp_config::SqliteMcpConfig;
use sqlite_mcp_store::MissingDatabasePolicy;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug, Default)]
#[command(name = "sqlite-mcp", about = "SQLite MCP server over JSON-RPC/HTTP", disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue)]
    show_version: bool,
    /// Configuration file (overrides `SQLITE_MCP_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bind address.
    #[arg(long, value_name = "IP")]
    host: Option<String>,
    /// Bind port.
    #[arg(long)]
    port: Option<u16>,
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
    /// Log output format.
    #[arg(long, value_enum, value_name = "FORMAT")]
    log_format: Option<LogFormatArg>,
    /// Maximum pooled connections.
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,
    /// Per-call execution time limit in seconds.
    #[arg(long, value_name = "SECS")]
    max_query_time: Option<u64>,
    /// Maximum rows returned by one statement.
    #[arg(long, value_name = "N")]
    max_result_rows: Option<usize>,
    /// Default database used when calls omit a path.
    #[arg(long, value_name = "PATH")]
    database: Option<String>,
    /// Create database files that do not exist yet.
    #[arg(long, action = ArgAction::SetTrue)]
    create_missing: bool,
    /// Validate the configuration and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    check_config: bool,
}

/// Log format flag values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormatArg {
    /// Human-readable single-line output.
    Compact,
    /// JSON lines.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the parsed command line.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    if cli.show_version {
        write_stdout_line(&format!("sqlite-mcp {}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    if cli.check_config {
        write_stdout_line(&config_summary(&config))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    command_serve(config).await
}

/// Loads the configuration file and applies flag overrides.
fn load_config(cli: &Cli) -> CliResult<SqliteMcpConfig> {
    let mut config = SqliteMcpConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    apply_overrides(&mut config, cli);
    config.validate().map_err(|err| CliError::new(format!("invalid configuration: {err}")))?;
    Ok(config)
}

/// Copies command-line values over file values.
fn apply_overrides(config: &mut SqliteMcpConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.server.log_level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.server.log_format = format.into();
    }
    if let Some(max_connections) = cli.max_connections {
        config.limits.max_connections = max_connections;
    }
    if let Some(max_query_time) = cli.max_query_time {
        config.limits.max_query_time_secs = max_query_time;
    }
    if let Some(max_result_rows) = cli.max_result_rows {
        config.limits.max_result_rows = max_result_rows;
    }
    if let Some(database) = &cli.database {
        config.database.default_path = Some(database.clone());
    }
    if cli.create_missing {
        config.database.missing = MissingDatabasePolicy::CreateIfMissing;
    }
}

/// Renders the one-line summary printed by `--check-config`.
fn config_summary(config: &SqliteMcpConfig) -> String {
    let source =
        config.source.as_ref().map_or_else(|| "defaults".to_string(), |path| path.display().to_string());
    format!(
        "configuration ok (source: {source}; bind: {}:{}; max_connections: {}; max_result_rows: {})",
        config.server.host, config.server.port, config.limits.max_connections, config.limits.max_result_rows
    )
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Starts logging and serves until a shutdown signal arrives.
async fn command_serve(config: SqliteMcpConfig) -> CliResult<ExitCode> {
    init_logging(&config.server.log_level, config.server.log_format);
    warn_network_exposure(&config.server.host);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        max_connections = config.limits.max_connections,
        "starting sqlite-mcp"
    );

    let server = tokio::task::spawn_blocking(move || McpServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve(shutdown_signal()).await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    tracing::info!("sqlite-mcp stopped");
    Ok(ExitCode::SUCCESS)
}

/// Warns when the server binds beyond loopback; there is no authentication.
fn warn_network_exposure(host: &str) {
    let exposed = host.parse::<IpAddr>().is_ok_and(|ip| !ip.is_loopback());
    if exposed {
        tracing::warn!(
            host,
            "binding a non-loopback address; every reachable client can read and write the \
             databases this server admits"
        );
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
