//! Structured error handling and exit codes.

use serde::Serialize;
use std::path::PathBuf;

/// Errors produced by the cache subsystem.
///
/// Per-item failures ([`CacheError::InvalidUrl`], [`CacheError::NotFound`])
/// are meant to be logged and skipped by batch callers; only resource
/// exhaustion ([`CacheError::WriteFailed`], [`CacheError::Io`]) should
/// abort a batch.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The URL could not be parsed into a domain and identifier.
    ///
    /// Callers must treat this as non-fatal and skip the item.
    #[error("invalid media URL: {0}")]
    InvalidUrl(String),

    /// A disk write or rename failed; no partial state was committed.
    #[error("write failed for {path}: {source}")]
    WriteFailed {
        /// Destination path of the failed write.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The post ID is empty or contains path-hostile characters.
    #[error("invalid post id: {0:?}")]
    InvalidPostId(String),

    /// No cached metadata exists for the given post ID.
    ///
    /// This is a cache miss, not a hard error.
    #[error("no cached metadata for post {0}")]
    NotFound(String),

    /// The on-disk submission index was unparseable.
    ///
    /// The store absorbs this internally (degrading to an empty index);
    /// it only surfaces from explicit index inspection paths.
    #[error("submission index unreadable: {0}")]
    IndexCorrupt(String),

    /// A long-running operation observed the shutdown flag and stopped.
    #[error("operation interrupted")]
    Interrupted,

    /// A network-bound collaborator exceeded its bounded timeout.
    #[error("timed out resolving {0}")]
    ResolveTimeout(String),

    /// An I/O error outside of a commit (scan, clear, directory creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Exit codes for the redcache maintenance CLI.
///
/// - 0: Success (operation completed, cache consistent)
/// - 1: General error (unexpected failure)
/// - 3: Partial success (completed with some non-fatal per-item errors)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the operation completed and the cache is consistent.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// Partial success: completed but some items could not be reconciled.
    PartialSuccess = 3,
    /// Interrupted: the operation was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RC000",
            Self::GeneralError => "RC001",
            Self::PartialSuccess => "RC003",
            Self::Interrupted => "RC130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "RC001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
