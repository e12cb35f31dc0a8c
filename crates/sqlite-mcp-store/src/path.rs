// sqlite-mcp-store/src/path.rs
// ============================================================================
// Module: Database Paths
// Description: Canonical database paths and the policy that admits them.
// Purpose: Resolve caller-supplied paths into pool keys without escapes.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! A [`DatabasePath`] is only produced by [`DatabasePolicy::resolve`], which
//! canonicalizes the input (resolving `..` and symlinks), enforces allowed
//! roots and extensions, and applies the [`MissingDatabasePolicy`]. The
//! canonical path is the identity key for pooling and write serialization.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::DbError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Files larger than this are admitted but logged.
const LARGE_DATABASE_BYTES: u64 = 1024 * 1024 * 1024;
/// Extensions admitted by the default policy.
pub const DEFAULT_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Canonical, absolute path to one SQLite file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DatabasePath(PathBuf);

impl DatabasePath {
    /// Returns the canonical filesystem path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Returns the path as a lossy UTF-8 string.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Behavior when a requested database file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDatabasePolicy {
    /// Missing files are reported as `NotFound`.
    #[default]
    Strict,
    /// Missing files are created empty on first open.
    CreateIfMissing,
}

/// Rules for admitting database paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePolicy {
    /// Directories a database must live under (empty allows any).
    pub allowed_roots: Vec<PathBuf>,
    /// Admitted file extensions without the dot (empty allows any).
    pub allowed_extensions: Vec<String>,
    /// Missing file behavior.
    pub missing: MissingDatabasePolicy,
}

impl Default for DatabasePolicy {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            missing: MissingDatabasePolicy::Strict,
        }
    }
}

impl DatabasePolicy {
    /// Returns true when opening may create the database file.
    #[must_use]
    pub const fn allows_create(&self) -> bool {
        matches!(self.missing, MissingDatabasePolicy::CreateIfMissing)
    }

    /// Resolves a caller-supplied path into a canonical [`DatabasePath`].
    ///
    /// # Errors
    ///
    /// - [`DbError::InvalidParameters`] for empty, oversized, directory, or
    ///   wrong-extension paths.
    /// - [`DbError::PermissionDenied`] when the path is outside the allowed
    ///   roots or unreadable.
    /// - [`DbError::NotFound`] when the file (or its parent directory) is
    ///   missing under the strict policy.
    pub fn resolve(&self, raw: &str) -> Result<DatabasePath, DbError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DbError::InvalidParameters("database path is empty".to_string()));
        }
        if trimmed.contains('\0') {
            return Err(DbError::InvalidParameters("database path contains NUL".to_string()));
        }
        let requested = PathBuf::from(trimmed);
        validate_path_limits(&requested)?;
        let absolute = if requested.is_absolute() {
            requested
        } else {
            std::env::current_dir()
                .map_err(|err| DbError::execution_failed(format!("cwd unavailable: {err}"), None))?
                .join(requested)
        };

        let exists = absolute.exists();
        let canonical = if exists {
            if absolute.is_dir() {
                return Err(DbError::InvalidParameters(format!(
                    "database path is a directory: {}",
                    absolute.display()
                )));
            }
            canonicalize(&absolute)?
        } else {
            let file_name = absolute.file_name().ok_or_else(|| {
                DbError::InvalidParameters("database path has no file name".to_string())
            })?;
            let parent = absolute.parent().ok_or_else(|| {
                DbError::InvalidParameters("database path has no parent directory".to_string())
            })?;
            canonicalize(parent)?.join(file_name)
        };

        self.check_extension(&canonical)?;
        self.check_roots(&canonical)?;

        if !exists {
            if self.allows_create() {
                return Ok(DatabasePath(canonical));
            }
            return Err(DbError::NotFound(format!(
                "database file does not exist: {}",
                canonical.display()
            )));
        }

        check_readable(&canonical)?;
        Ok(DatabasePath(canonical))
    }

    /// Rejects files whose extension is not admitted.
    fn check_extension(&self, path: &Path) -> Result<(), DbError> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        if self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(extension)) {
            return Ok(());
        }
        Err(DbError::InvalidParameters(format!(
            "database extension must be one of: {}",
            self.allowed_extensions.join(", ")
        )))
    }

    /// Rejects canonical paths outside every allowed root.
    fn check_roots(&self, path: &Path) -> Result<(), DbError> {
        if self.allowed_roots.is_empty() {
            return Ok(());
        }
        let inside = self
            .allowed_roots
            .iter()
            .filter_map(|root| fs::canonicalize(root).ok())
            .any(|root| path.starts_with(root));
        if inside {
            return Ok(());
        }
        Err(DbError::PermissionDenied(format!(
            "database path is outside the allowed roots: {}",
            path.display()
        )))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates path length limits before touching the filesystem.
fn validate_path_limits(path: &Path) -> Result<(), DbError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(DbError::InvalidParameters("database path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(DbError::InvalidParameters(
                "database path component too long".to_string(),
            ));
        }
    }
    Ok(())
}

/// Canonicalizes a path, mapping I/O failures onto error kinds.
fn canonicalize(path: &Path) -> Result<PathBuf, DbError> {
    fs::canonicalize(path).map_err(|err| map_io_error(&err, path))
}

/// Confirms the file can be opened for reading and logs very large files.
fn check_readable(path: &Path) -> Result<(), DbError> {
    let file = fs::File::open(path).map_err(|err| map_io_error(&err, path))?;
    if let Ok(metadata) = file.metadata()
        && metadata.len() > LARGE_DATABASE_BYTES
    {
        tracing::warn!(
            path = %path.display(),
            bytes = metadata.len(),
            "large database file may produce slow queries"
        );
    }
    Ok(())
}

/// Maps filesystem errors onto store error kinds.
fn map_io_error(err: &io::Error, path: &Path) -> DbError {
    match err.kind() {
        io::ErrorKind::NotFound => DbError::NotFound(format!("path does not exist: {}", path.display())),
        io::ErrorKind::PermissionDenied => {
            DbError::PermissionDenied(format!("cannot access {}", path.display()))
        }
        _ => DbError::execution_failed(format!("cannot access {}: {err}", path.display()), None),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use std::fs;

    use super::DatabasePolicy;
    use super::MissingDatabasePolicy;
    use crate::error::ErrorKind;

    #[test]
    fn resolve_canonicalizes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("app.db"), b"").unwrap();
        let raw = dir.path().join("nested").join("..").join("app.db");
        let resolved = DatabasePolicy::default().resolve(raw.to_str().unwrap()).unwrap();
        assert_eq!(resolved.as_path(), fs::canonicalize(dir.path().join("app.db")).unwrap());
    }

    #[test]
    fn strict_policy_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("missing.db");
        let err = DatabasePolicy::default().resolve(raw.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn create_policy_admits_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("fresh.sqlite");
        let policy = DatabasePolicy {
            missing: MissingDatabasePolicy::CreateIfMissing,
            ..DatabasePolicy::default()
        };
        let resolved = policy.resolve(raw.to_str().unwrap()).unwrap();
        assert!(resolved.as_path().ends_with("fresh.sqlite"));
        assert!(!raw.exists());
    }

    #[test]
    fn disallowed_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let raw = dir.path().join("notes.txt");
        let err = DatabasePolicy::default().resolve(raw.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn traversal_outside_roots_is_denied() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("other.db"), b"").unwrap();
        let policy = DatabasePolicy {
            allowed_roots: vec![root.path().to_path_buf()],
            ..DatabasePolicy::default()
        };
        let escape = root.path().join("..").join(outside.path().file_name().unwrap()).join("other.db");
        let err = policy.resolve(escape.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatabasePolicy::default().resolve(dir.path().to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }
}
