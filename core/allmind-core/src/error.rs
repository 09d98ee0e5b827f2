//! Error types for allmind-core operations.
//!
//! `AllmindError` is what the query surface returns. `ProbeError` is what a
//! single probe returns; the snapshot builder never lets one escape, it turns
//! each into an in-band sentinel on the affected record.

use std::path::PathBuf;
use std::time::Duration;

/// All errors that can surface from allmind-core operations.
#[derive(Debug, thiserror::Error)]
pub enum AllmindError {
    // ─────────────────────────────────────────────────────────────────────
    // Registry Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Registry read failed: {path}: {source}")]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry malformed: {path}: {source}")]
    RegistryMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Registry not found at {0}")]
    RegistryNotFound(PathBuf),

    // ─────────────────────────────────────────────────────────────────────
    // Entity Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Repo not found: {0}")]
    RepoNotFound(String),

    // ─────────────────────────────────────────────────────────────────────
    // Shim Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Shims directory unreadable: {path}: {source}")]
    ShimDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Output Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AllmindError {
    /// True for the 404-equivalent case the route layer maps to "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AllmindError::RepoNotFound(_) | AllmindError::RegistryNotFound(_)
        )
    }
}

/// Convenience type alias for Results using AllmindError.
pub type Result<T> = std::result::Result<T, AllmindError>;

/// Failure of one probe against one repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to spawn {command}: {details}")]
    Spawn { command: String, details: String },

    #[error("{command} exited with {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} timed out after {}ms", .after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("Unexpected output from {command}: {details}")]
    Parse { command: String, details: String },

    #[error("I/O error: {context}: {details}")]
    Io { context: String, details: String },

    #[error("Probe panicked: {0}")]
    Panicked(String),
}

impl ProbeError {
    pub fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        ProbeError::Io {
            context: context.into(),
            details: err.to_string(),
        }
    }
}
