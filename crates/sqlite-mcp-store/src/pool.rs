// sqlite-mcp-store/src/pool.rs
// ============================================================================
// Module: Connection Manager
// Description: Bounded pool of SQLite connections keyed by database path.
// Purpose: Lend connections to concurrent callers without exceeding limits.
// Dependencies: rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! [`ConnectionManager`] owns every open connection. Callers borrow one as a
//! [`ConnectionLease`], which returns it to the idle set when dropped.
//!
//! Invariants:
//! - Total open connections across all paths never exceed
//!   [`PoolConfig::max_connections`].
//! - At most one [`AccessMode::Write`] lease per path is outstanding, so
//!   writes to one file are serialized by the manager instead of by driver
//!   lock retries. Reads run concurrently.
//! - Waiting for capacity or for the writer slot is bounded by
//!   [`PoolConfig::acquire_timeout`] and then fails with `CapacityExceeded`.
//!
//! Pool membership only changes under the manager lock. Opening, health
//! checking, and closing connections happen outside it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use serde::Serialize;

use crate::error::DbError;
use crate::error::classify_driver_error;
use crate::path::DatabasePath;
use crate::path::DatabasePolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum number of open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
/// Default time to wait for capacity or the writer slot.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default `SQLite` busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of consecutive failures before a connection is dropped.
pub const DEFAULT_MAX_CONNECTION_FAILURES: u32 = 3;
/// Page cache size pragma (negative values are KiB).
const CACHE_SIZE_KIB: i64 = -64_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (readers do not block the writer).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    Full,
    /// Normal synchronous mode (balanced, safe with WAL).
    #[default]
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Connection manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum open connections across every database path.
    pub max_connections: usize,
    /// Maximum time to wait for capacity or the writer slot.
    pub acquire_timeout: Duration,
    /// Driver busy timeout for lock contention from outside the pool.
    pub busy_timeout: Duration,
    /// Journal mode applied to new connections.
    pub journal_mode: SqliteJournalMode,
    /// Sync mode applied to new connections.
    pub sync_mode: SqliteSyncMode,
    /// Consecutive statement failures before a connection is discarded.
    pub max_connection_failures: u32,
    /// Path admission policy.
    pub policy: DatabasePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_connection_failures: DEFAULT_MAX_CONNECTION_FAILURES,
            policy: DatabasePolicy::default(),
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Access requested for a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read-only statements; many may run concurrently per path.
    Read,
    /// Mutating statements; one lease per path at a time.
    Write,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured connection limit.
    pub max_connections: usize,
    /// Connections currently open (idle plus checked out).
    pub open_connections: usize,
    /// Connections waiting in idle sets.
    pub idle_connections: usize,
    /// Connections currently lent out.
    pub checked_out: usize,
    /// Database paths with pool entries.
    pub databases: usize,
    /// Successful acquisitions since start.
    pub acquisitions: u64,
    /// Connections discarded as unhealthy.
    pub discarded: u64,
    /// Acquisitions rejected for lack of capacity.
    pub capacity_rejections: u64,
}

/// Idle connection waiting for reuse.
struct IdleConnection {
    /// Open driver handle.
    connection: Connection,
    /// Time the connection was last returned.
    last_used: Instant,
    /// Consecutive statement failures carried across leases.
    failures: u32,
}

/// Per-path pool entry.
#[derive(Default)]
struct PathPool {
    /// Idle connections, least recently used first.
    idle: Vec<IdleConnection>,
    /// Leases currently outstanding.
    checked_out: usize,
    /// True while a write lease is outstanding.
    writer_active: bool,
}

impl PathPool {
    /// Records a new outstanding lease.
    const fn claim(&mut self, mode: AccessMode) {
        self.checked_out += 1;
        if matches!(mode, AccessMode::Write) {
            self.writer_active = true;
        }
    }

    /// Records a returned lease.
    const fn unclaim(&mut self, mode: AccessMode) {
        self.checked_out = self.checked_out.saturating_sub(1);
        if matches!(mode, AccessMode::Write) {
            self.writer_active = false;
        }
    }

    /// Returns true when the entry holds nothing.
    const fn is_vacant(&self) -> bool {
        self.idle.is_empty() && self.checked_out == 0 && !self.writer_active
    }
}

/// Shared pool state guarded by the manager lock.
#[derive(Default)]
struct PoolState {
    /// Per-path entries.
    pools: HashMap<DatabasePath, PathPool>,
    /// Open connections across all paths.
    open_total: usize,
    /// Set once [`ConnectionManager::shutdown_all`] runs.
    shut_down: bool,
    /// Successful acquisitions.
    acquisitions: u64,
    /// Connections discarded as unhealthy.
    discarded: u64,
    /// Acquisitions rejected for capacity.
    capacity_rejections: u64,
}

impl PoolState {
    /// Drops the entry for `path` when it no longer holds anything.
    fn prune(&mut self, path: &DatabasePath) {
        if self.pools.get(path).is_some_and(PathPool::is_vacant) {
            self.pools.remove(path);
        }
    }
}

/// Slot reserved under the lock and completed outside it.
enum Reservation {
    /// Reuse an idle connection.
    Idle(IdleConnection),
    /// Open a new connection, closing an evicted one first.
    Fresh {
        /// Least recently used idle connection of another path.
        evicted: Option<IdleConnection>,
    },
}

/// Manager internals shared by clones and leases.
struct ManagerInner {
    /// Settings.
    config: PoolConfig,
    /// Pool state.
    state: Mutex<PoolState>,
    /// Signalled whenever capacity or a writer slot frees up.
    available: Condvar,
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// Bounded, path-keyed connection pool.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Shared internals.
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Creates an empty manager; connections open lazily.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] when `max_connections` is zero.
    pub fn new(config: PoolConfig) -> Result<Self, DbError> {
        if config.max_connections == 0 {
            return Err(DbError::InvalidParameters(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                state: Mutex::new(PoolState::default()),
                available: Condvar::new(),
            }),
        })
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Resolves a caller-supplied path through the configured policy.
    ///
    /// # Errors
    ///
    /// See [`DatabasePolicy::resolve`].
    pub fn resolve(&self, raw: &str) -> Result<DatabasePath, DbError> {
        self.inner.config.policy.resolve(raw)
    }

    /// Borrows a connection for `path`.
    ///
    /// Blocks until an idle connection, free capacity, or (for writes) the
    /// writer slot is available, up to the acquire timeout.
    ///
    /// # Errors
    ///
    /// - [`DbError::CapacityExceeded`] when the wait times out or the manager
    ///   has been shut down.
    /// - Driver errors from opening a new connection.
    pub fn acquire(&self, path: &DatabasePath, mode: AccessMode) -> Result<ConnectionLease, DbError> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.acquire_timeout;
        let mut state = self.lock_state();
        let reservation = loop {
            if state.shut_down {
                return Err(DbError::CapacityExceeded("connection manager is shut down".to_string()));
            }
            if let Some(reservation) = try_reserve(&mut state, config.max_connections, path, mode) {
                break reservation;
            }
            let now = Instant::now();
            if now >= deadline {
                state.capacity_rejections += 1;
                state.prune(path);
                let reason = if matches!(mode, AccessMode::Write) {
                    "writer slot or connection capacity"
                } else {
                    "connection capacity"
                };
                return Err(DbError::CapacityExceeded(format!(
                    "timed out after {} ms waiting for {reason} ({} connections max)",
                    config.acquire_timeout.as_millis(),
                    config.max_connections
                )));
            }
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        };
        state.acquisitions += 1;
        drop(state);

        match self.complete_reservation(path, reservation) {
            Ok((connection, failures)) => Ok(ConnectionLease {
                manager: self.clone(),
                path: path.clone(),
                mode,
                connection: Some(connection),
                failures,
                healthy: true,
            }),
            Err(err) => {
                self.abandon(path, mode);
                Err(err)
            }
        }
    }

    /// Returns a lease to the pool. Equivalent to dropping it.
    pub fn release(&self, lease: ConnectionLease) {
        drop(lease);
    }

    /// Closes every idle connection and refuses further acquisitions.
    ///
    /// Outstanding leases are closed when they are returned. Returns the
    /// number of connections closed immediately.
    pub fn shutdown_all(&self) -> usize {
        let mut state = self.lock_state();
        state.shut_down = true;
        let mut closed = Vec::new();
        for pool in state.pools.values_mut() {
            closed.extend(pool.idle.drain(..));
        }
        state.open_total = state.open_total.saturating_sub(closed.len());
        state.pools.retain(|_, pool| !pool.is_vacant());
        drop(state);
        self.inner.available.notify_all();
        let count = closed.len();
        drop(closed);
        tracing::info!(closed = count, "connection manager shut down");
        count
    }

    /// Returns a snapshot of pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            max_connections: self.inner.config.max_connections,
            open_connections: state.open_total,
            idle_connections: state.pools.values().map(|pool| pool.idle.len()).sum(),
            checked_out: state.pools.values().map(|pool| pool.checked_out).sum(),
            databases: state.pools.len(),
            acquisitions: state.acquisitions,
            discarded: state.discarded,
            capacity_rejections: state.capacity_rejections,
        }
    }

    /// Locks pool state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns a reservation into a usable connection outside the lock.
    fn complete_reservation(
        &self,
        path: &DatabasePath,
        reservation: Reservation,
    ) -> Result<(Connection, u32), DbError> {
        match reservation {
            Reservation::Idle(idle) => {
                if is_healthy(&idle.connection, path) {
                    return Ok((idle.connection, idle.failures));
                }
                tracing::warn!(database = %path, "discarding connection that failed health check");
                drop(idle);
                self.lock_state().discarded += 1;
                Ok((self.open_connection(path)?, 0))
            }
            Reservation::Fresh {
                evicted,
            } => {
                if evicted.is_some() {
                    tracing::debug!(database = %path, "evicted idle connection to make room");
                }
                drop(evicted);
                Ok((self.open_connection(path)?, 0))
            }
        }
    }

    /// Releases a reserved slot whose connection could not be opened.
    fn abandon(&self, path: &DatabasePath, mode: AccessMode) {
        let mut state = self.lock_state();
        state.open_total = state.open_total.saturating_sub(1);
        if let Some(pool) = state.pools.get_mut(path) {
            pool.unclaim(mode);
        }
        state.prune(path);
        drop(state);
        self.inner.available.notify_all();
    }

    /// Returns a connection from a dropped lease.
    fn check_in(
        &self,
        path: &DatabasePath,
        mode: AccessMode,
        connection: Connection,
        failures: u32,
        healthy: bool,
    ) {
        let keep = healthy && failures < self.inner.config.max_connection_failures;
        let mut state = self.lock_state();
        let shut_down = state.shut_down;
        let mut closing = Some(connection);
        if let Some(pool) = state.pools.get_mut(path) {
            pool.unclaim(mode);
            if keep
                && !shut_down
                && let Some(connection) = closing.take()
            {
                pool.idle.push(IdleConnection {
                    connection,
                    last_used: Instant::now(),
                    failures,
                });
            }
        }
        if closing.is_some() {
            state.open_total = state.open_total.saturating_sub(1);
            if !keep {
                state.discarded += 1;
            }
        }
        state.prune(path);
        drop(state);
        self.inner.available.notify_all();
        if closing.is_some() && !keep {
            tracing::warn!(database = %path, failures, "discarded unhealthy connection");
        }
        drop(closing);
    }

    /// Opens and configures a new connection.
    fn open_connection(&self, path: &DatabasePath) -> Result<Connection, DbError> {
        let config = &self.inner.config;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        if config.policy.allows_create() {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        } else if !path.as_path().exists() {
            return Err(DbError::NotFound(format!("database file does not exist: {path}")));
        }
        let connection = Connection::open_with_flags(path.as_path(), flags)
            .map_err(|err| classify_driver_error(&err, None))?;
        apply_pragmas(&connection, config).map_err(|err| classify_driver_error(&err, None))?;
        tracing::debug!(database = %path, "opened connection");
        Ok(connection)
    }
}

// ============================================================================
// SECTION: Leases
// ============================================================================

/// Connection borrowed from a [`ConnectionManager`].
///
/// Dropping the lease returns the connection; unhealthy connections are
/// closed instead of pooled.
pub struct ConnectionLease {
    /// Owning manager.
    manager: ConnectionManager,
    /// Database the connection belongs to.
    path: DatabasePath,
    /// Access granted by the manager.
    mode: AccessMode,
    /// Driver handle; only `None` while being returned.
    connection: Option<Connection>,
    /// Consecutive statement failures.
    failures: u32,
    /// Cleared when the connection must not be reused.
    healthy: bool,
}

impl ConnectionLease {
    /// Returns the database path for this lease.
    #[must_use]
    pub const fn path(&self) -> &DatabasePath {
        &self.path
    }

    /// Returns the access mode granted.
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns the borrowed driver handle.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ExecutionFailed`] if the lease was already returned.
    pub fn connection(&self) -> Result<&Connection, DbError> {
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::execution_failed("connection lease already released", None))
    }

    /// Marks the connection so it is closed instead of pooled.
    pub const fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    /// Returns false once the lease has been marked unhealthy.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Records a failed statement.
    pub const fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Records a successful statement.
    pub const fn record_success(&mut self) {
        self.failures = 0;
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if !connection.is_autocommit() && connection.execute_batch("ROLLBACK").is_err() {
                self.healthy = false;
            }
            self.manager.check_in(&self.path, self.mode, connection, self.failures, self.healthy);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reserves a slot for `path` if one is available right now.
fn try_reserve(
    state: &mut PoolState,
    max_connections: usize,
    path: &DatabasePath,
    mode: AccessMode,
) -> Option<Reservation> {
    let pool = state.pools.entry(path.clone()).or_default();
    if matches!(mode, AccessMode::Write) && pool.writer_active {
        return None;
    }
    if let Some(idle) = pool.idle.pop() {
        pool.claim(mode);
        return Some(Reservation::Idle(idle));
    }
    if state.open_total < max_connections {
        state.open_total += 1;
        state.pools.entry(path.clone()).or_default().claim(mode);
        return Some(Reservation::Fresh {
            evicted: None,
        });
    }
    let victim = state
        .pools
        .iter()
        .filter(|(key, pool)| *key != path && !pool.idle.is_empty())
        .min_by_key(|(_, pool)| pool.idle.first().map(|idle| idle.last_used))
        .map(|(key, _)| key.clone())?;
    let evicted = state.pools.get_mut(&victim).map(|pool| pool.idle.remove(0));
    state.prune(&victim);
    state.pools.entry(path.clone()).or_default().claim(mode);
    Some(Reservation::Fresh {
        evicted,
    })
}

/// Applies connection pragmas.
fn apply_pragmas(connection: &Connection, config: &PoolConfig) -> rusqlite::Result<()> {
    connection.busy_timeout(config.busy_timeout)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.execute_batch(&format!("PRAGMA cache_size = {CACHE_SIZE_KIB};"))?;
    connection.execute_batch("PRAGMA temp_store = MEMORY;")?;
    Ok(())
}

/// Checks that an idle connection can still serve statements.
fn is_healthy(connection: &Connection, path: &DatabasePath) -> bool {
    path.as_path().is_file()
        && connection.is_autocommit()
        && connection.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
}
