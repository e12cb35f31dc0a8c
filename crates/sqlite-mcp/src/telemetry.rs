// sqlite-mcp/src/telemetry.rs
// ============================================================================
// Module: MCP Telemetry
// Description: Request labels, counters, and latency buckets.
// Purpose: Track dispatcher outcomes for the health endpoint and audit log.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Labels in this module are stable strings shared by audit events and log
//! fields. [`ServerStats`] is a lock-free counter set updated once per
//! request and read by `GET /health`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency bucket upper bounds in milliseconds for request histograms.
pub const MCP_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

/// Requests slower than this are logged at warn level.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Labels
// ============================================================================

/// JSON-RPC method classification.
///
/// # Invariants
/// - Variants are stable for audit and log labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum McpMethod {
    /// `initialize` handshake.
    Initialize,
    /// `notifications/initialized` notification.
    Initialized,
    /// `ping` liveness probe.
    Ping,
    /// `tools/list`.
    ToolsList,
    /// `tools/call`.
    ToolsCall,
    /// Tool name used directly as the method.
    DirectTool,
    /// Malformed or oversized request.
    Invalid,
    /// Unsupported method.
    Other,
}

impl McpMethod {
    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::DirectTool => "direct_tool",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }
}

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum McpOutcome {
    /// Result envelope returned.
    Ok,
    /// Error envelope returned.
    Error,
}

impl McpOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// SECTION: Server Stats
// ============================================================================

/// Process-wide request counters.
#[derive(Debug)]
pub struct ServerStats {
    /// Time the stats were created.
    started: Instant,
    /// Requests seen.
    total: AtomicU64,
    /// Requests answered with a result.
    successful: AtomicU64,
    /// Requests answered with an error.
    failed: AtomicU64,
    /// Latency histogram, one slot per bucket plus an overflow slot.
    latency: Vec<AtomicU64>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency: (0 ..= MCP_LATENCY_BUCKETS_MS.len()).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Records one finished request.
    pub fn record(&self, outcome: McpOutcome, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            McpOutcome::Ok => self.successful.fetch_add(1, Ordering::Relaxed),
            McpOutcome::Error => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let slot = MCP_LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| millis <= *bound)
            .unwrap_or(MCP_LATENCY_BUCKETS_MS.len());
        if let Some(counter) = self.latency.get(slot) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a consistent-enough copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let latency_ms = self
            .latency
            .iter()
            .enumerate()
            .map(|(index, counter)| LatencyBucket {
                le_ms: MCP_LATENCY_BUCKETS_MS.get(index).copied(),
                count: counter.load(Ordering::Relaxed),
            })
            .collect();
        StatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
            latency_ms,
        }
    }
}

/// Serializable view of [`ServerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests seen.
    pub total_requests: u64,
    /// Requests answered with a result.
    pub successful_requests: u64,
    /// Requests answered with an error.
    pub failed_requests: u64,
    /// Seconds since the counters were created.
    pub uptime_secs: u64,
    /// Latency histogram.
    pub latency_ms: Vec<LatencyBucket>,
}

/// One histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    /// Inclusive upper bound; `None` for the overflow bucket.
    pub le_ms: Option<u64>,
    /// Requests that fell into the bucket.
    pub count: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Duration;

    use super::McpOutcome;
    use super::ServerStats;

    #[test]
    fn record_updates_counters_and_buckets() {
        let stats = ServerStats::new();
        stats.record(McpOutcome::Ok, Duration::from_millis(3));
        stats.record(McpOutcome::Error, Duration::from_secs(120));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        let five = snapshot.latency_ms.iter().find(|bucket| bucket.le_ms == Some(5)).unwrap();
        assert_eq!(five.count, 1);
        assert_eq!(snapshot.latency_ms.last().unwrap().count, 1);
    }
}
