//! Probe adapters: read-only views of a repository's live state.
//!
//! The snapshot builder talks to the outside world only through
//! [`RepoProbe`]. Production uses [`LiveProbe`], which checks the filesystem
//! and shells out to `git`; tests inject a scripted probe.

mod command;
mod live;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use live::LiveProbe;

use std::path::Path;

use crate::error::ProbeError;
use crate::types::{CommitSummary, GitStatus, IngestionStatus, ToolMarkers};

/// Trait for live-state probes against one repository path.
///
/// Implementors should:
/// - Bound every external command by a timeout and report expiry as an error
/// - Return `Ok(None)`/empty for "nothing there", reserving `Err` for failures
/// - Never panic; the builder contains panics, but they cost the whole entry
pub trait RepoProbe: Send + Sync {
    /// Whether the declared path exists at all.
    fn path_exists(&self, path: &Path) -> bool;

    /// Git status, or `None` when the path is not a git repository.
    fn git_status(&self, path: &Path) -> Result<Option<GitStatus>, ProbeError>;

    /// Tooling capability flags.
    fn tool_markers(&self, path: &Path) -> Result<ToolMarkers, ProbeError>;

    /// A runnable test command, if one can be inferred.
    fn test_command(&self, path: &Path, markers: &ToolMarkers)
        -> Result<Option<String>, ProbeError>;

    /// Up to `limit` commits, newest first.
    fn recent_commits(&self, path: &Path, limit: usize)
        -> Result<Vec<CommitSummary>, ProbeError>;

    /// Secondary ingestion/indexing state for the entry, if any.
    fn ingestion_status(
        &self,
        _name: &str,
        _path: &Path,
    ) -> Result<Option<IngestionStatus>, ProbeError> {
        Ok(None)
    }
}
