//! Core types shared by the cache, the shim reconciler and the query surface.
//!
//! Registry types mirror the strap registry document and are read-only here.
//! Everything else is derived: rebuilt wholesale on each scan or computed
//! fresh per call. Output types serialize camelCase to match the dashboard's
//! JSON API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════════
// Registry Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The persisted strap registry: known repos and the shims they own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub repos: Vec<RegistryEntry>,
}

/// One repository known to strap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(
        default,
        rename = "repoPath",
        alias = "repo_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shims: Option<ShimBindings>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RegistryEntry {
    /// Minimal entry, used by tests and callers building registries in code.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            scope: None,
            repo_path: None,
            tags: Vec::new(),
            status: None,
            shims: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.repo_path = Some(path.into());
        self
    }

    pub fn with_shims<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bindings = names.into_iter().map(ShimBinding::named).collect();
        self.shims = Some(ShimBindings::Many(bindings));
        self
    }

    /// Shim bindings declared by this entry, in document order.
    pub fn shim_bindings(&self) -> &[ShimBinding] {
        match &self.shims {
            Some(ShimBindings::Many(bindings)) => bindings,
            Some(ShimBindings::One(binding)) => std::slice::from_ref(binding),
            None => &[],
        }
    }
}

/// Older registries wrote a single binding object instead of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShimBindings {
    Many(Vec<ShimBinding>),
    One(ShimBinding),
}

/// A shim launcher owned by a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawShimBinding")]
pub struct ShimBinding {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venv: Option<String>,
}

impl ShimBinding {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exe: None,
            kind: None,
            venv: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawShimBinding {
    Bare(String),
    Full {
        name: String,
        #[serde(default)]
        exe: Option<String>,
        #[serde(default, rename = "type", alias = "kind")]
        kind: Option<String>,
        #[serde(default)]
        venv: Option<String>,
    },
}

impl From<RawShimBinding> for ShimBinding {
    fn from(raw: RawShimBinding) -> Self {
        match raw {
            RawShimBinding::Bare(name) => ShimBinding::named(name),
            RawShimBinding::Full {
                name,
                exe,
                kind,
                venv,
            } => ShimBinding {
                name,
                exe,
                kind,
                venv,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe Result Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Live git state of a repository, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GitState {
    Tracked(GitStatus),
    /// Path exists but carries no `.git`.
    NotARepository,
    /// Declared path is absent on disk.
    PathNotFound,
    /// The git probe failed or timed out.
    Error { error: String },
}

impl GitState {
    pub fn status(&self) -> Option<&GitStatus> {
        match self {
            GitState::Tracked(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GitState::Error { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub branch: String,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub remotes: Vec<String>,
}

/// Fixed set of tooling capability flags detected in a repo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMarkers {
    pub claude_project: bool,
    pub venv: bool,
    pub node: bool,
    pub python: bool,
    pub memory: bool,
}

impl ToolMarkers {
    pub fn any(&self) -> bool {
        self.claude_project || self.venv || self.node || self.python || self.memory
    }
}

/// One commit from a repo's recent history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub hash: String,
    pub author: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
}

/// Ingestion/indexing state reported by the external indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStatus {
    pub status: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "processed_count")]
    pub processed_count: u64,
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Live state of one registry entry.
///
/// A record with `exists == false` always carries `GitState::PathNotFound`,
/// default tool markers and no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub path: String,
    pub exists: bool,
    pub shim_count: usize,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub git: GitState,
    pub tools: ToolMarkers,
    pub test_command: Option<String>,
    pub recent_commits: Vec<CommitSummary>,
    pub ingestion: Option<IngestionStatus>,
}

/// One complete, atomically-published scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Zero for the first-boot placeholder, then strictly increasing.
    pub generation: u64,
    pub repos: Vec<RepoRecord>,
    pub root: String,
    pub count: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Set when the registry could not be read and the scan degraded to empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_error: Option<String>,
}

impl Snapshot {
    /// The state served before the first scan completes.
    pub fn placeholder(root: impl Into<String>) -> Self {
        Self {
            generation: 0,
            repos: Vec::new(),
            root: root.into(),
            count: 0,
            completed_at: None,
            duration_ms: 0,
            registry_error: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.generation == 0
    }

    pub fn find(&self, name: &str) -> Option<&RepoRecord> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            total: self.repos.len(),
            ..ScanSummary::default()
        };
        for repo in &self.repos {
            match &repo.git {
                GitState::PathNotFound => summary.missing += 1,
                GitState::Error { .. } => summary.git_errors += 1,
                GitState::Tracked(status) if status.dirty => summary.dirty += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Counts logged after each scan and shown by `watch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total: usize,
    pub missing: usize,
    pub git_errors: usize,
    pub dirty: usize,
}

/// What `read()` hands out: the current snapshot plus freshness annotations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    #[serde(flatten)]
    pub snapshot: Arc<Snapshot>,
    /// False while serving the first-boot placeholder.
    pub cached: bool,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Memory documents kept under `docs/memory/` in a repo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocs {
    pub state: Option<String>,
    pub constraints: Option<String>,
}

/// A cached record plus documents read on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDetail {
    #[serde(flatten)]
    pub repo: RepoRecord,
    pub memory: Option<MemoryDocs>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shim Report Types
// ═══════════════════════════════════════════════════════════════════════════════

pub const UNKNOWN: &str = "unknown";

/// A launcher pair found in the shims directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimArtifact {
    pub name: String,
    pub script_path: String,
    pub companion_exists: bool,
    /// Owning repo declared inside the launcher, or `"unknown"`.
    pub repo: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub venv: Option<String>,
    pub exe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Two or more registry entries claiming the same shim name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionRecord {
    pub shim: String,
    /// Owner of record first, then challengers in registry order.
    pub owners: Vec<String>,
}

impl CollisionRecord {
    pub fn owner_of_record(&self) -> &str {
        self.owners.first().map(String::as_str).unwrap_or(UNKNOWN)
    }

    pub fn challengers(&self) -> &[String] {
        self.owners.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimReport {
    #[serde(rename = "shims")]
    pub artifacts: Vec<ShimArtifact>,
    pub collisions: Vec<CollisionRecord>,
    pub orphans: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Doctor Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorCheck {
    pub id: &'static str,
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DoctorSummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorReport {
    pub summary: DoctorSummary,
    pub checks: Vec<DoctorCheck>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_entry_accepts_list_or_single_shim_binding() {
        let json = r#"{
            "repos": [
                {"name": "a", "shims": [{"name": "foo", "type": "python"}, "bar"]},
                {"name": "b", "shims": {"name": "baz"}},
                {"name": "c", "shims": null},
                {"name": "d"}
            ]
        }"#;
        let registry: Registry = serde_json::from_str(json).unwrap();
        let names = |entry: &RegistryEntry| {
            entry
                .shim_bindings()
                .iter()
                .map(|b| b.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&registry.repos[0]), vec!["foo", "bar"]);
        assert_eq!(
            registry.repos[0].shim_bindings()[0].kind.as_deref(),
            Some("python")
        );
        assert_eq!(names(&registry.repos[1]), vec!["baz"]);
        assert!(names(&registry.repos[2]).is_empty());
        assert!(names(&registry.repos[3]).is_empty());
    }

    #[test]
    fn registry_entry_reads_repo_path_and_timestamps() {
        let json = r#"{
            "name": "tool",
            "repoPath": "/srv/tool",
            "created_at": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-02-01T00:00:00Z",
            "unexpected": 1
        }"#;
        let entry: RegistryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.repo_path.as_deref(), Some("/srv/tool"));
        assert_eq!(entry.created_at.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(entry.updated_at.as_deref(), Some("2025-02-01T00:00:00Z"));
    }

    #[test]
    fn git_state_serializes_with_state_tag() {
        let value = serde_json::to_value(GitState::PathNotFound).unwrap();
        assert_eq!(value, serde_json::json!({"state": "path_not_found"}));

        let tracked = GitState::Tracked(GitStatus {
            branch: "main".to_string(),
            dirty: true,
            ..GitStatus::default()
        });
        let value = serde_json::to_value(tracked).unwrap();
        assert_eq!(value["state"], "tracked");
        assert_eq!(value["branch"], "main");
        assert_eq!(value["dirty"], true);
    }

    #[test]
    fn collision_record_splits_owner_and_challengers() {
        let record = CollisionRecord {
            shim: "foo".to_string(),
            owners: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(record.owner_of_record(), "a");
        assert_eq!(record.challengers(), ["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn cached_snapshot_flattens_snapshot_fields() {
        let cached = CachedSnapshot {
            snapshot: Arc::new(Snapshot::placeholder("/srv")),
            cached: false,
            last_updated: None,
            message: Some("initializing".to_string()),
        };
        let value = serde_json::to_value(&cached).unwrap();
        assert_eq!(value["count"], 0);
        assert_eq!(value["root"], "/srv");
        assert_eq!(value["cached"], false);
        assert_eq!(value["repos"], serde_json::json!([]));
    }
}
