// sqlite-mcp/src/logging.rs
// ============================================================================
// Module: Logging
// Description: Process-wide tracing subscriber setup.
// Purpose: Route diagnostics to stderr in compact or JSON form.
// Dependencies: tracing-subscriber, sqlite-mcp-config
// ============================================================================

//! ## Overview
//! [`init_logging`] installs one global subscriber. `RUST_LOG` wins over the
//! configured level when set. Repeated calls are no-ops so tests and the
//! binary can both call it.

use std::io::Write;
use std::sync::OnceLock;

use sqlite_mcp_config::LogFormat;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Guards subscriber installation.
static LOGGING_INIT: OnceLock<bool> = OnceLock::new();

/// Installs the global tracing subscriber once.
///
/// Returns true when this process has a subscriber installed by this
/// function, false when another subscriber was already present.
pub fn init_logging(level: &str, format: LogFormat) -> bool {
    *LOGGING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init(),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                let _ = writeln!(std::io::stderr(), "sqlite-mcp: tracing init skipped: {err}");
                false
            }
        }
    })
}
