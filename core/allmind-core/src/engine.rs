//! Dashboard - the query surface the route layer calls into.
//!
//! Every read goes through the cache; nothing here scans on its own except
//! `get_snapshot(true)`, which joins or runs a refresh before reading. Shim
//! reports and doctor checks are recomputed per call.
//!
//! ```rust,ignore
//! use allmind_core::Dashboard;
//!
//! let dashboard = Dashboard::from_env();
//! let _refresher = dashboard.start_refresher();
//! let repo = dashboard.get_entity("my-tool")?;
//! ```

use fs_err as fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{RefresherHandle, RepoCache};
use crate::config::{CacheConfig, StrapConfig};
use crate::doctor;
use crate::error::{AllmindError, Result};
use crate::probes::{LiveProbe, RepoProbe};
use crate::registry::read_registry;
use crate::shims::reconcile_shims;
use crate::snapshot::SnapshotBuilder;
use crate::types::{
    CachedSnapshot, DoctorReport, MemoryDocs, Registry, RepoDetail, RepoRecord, ShimReport,
};

const MEMORY_DIR: &[&str] = &["docs", "memory"];
const STATE_DOC: &str = "STATE.md";
const CONSTRAINTS_DOC: &str = "CONSTRAINTS.md";

pub struct Dashboard {
    cache: Arc<RepoCache>,
    config: CacheConfig,
}

impl Dashboard {
    /// Builds a dashboard over the live probe, configured from the environment.
    pub fn from_env() -> Self {
        let strap = StrapConfig::from_env();
        let config = CacheConfig::from_env();
        let probe = LiveProbe::new(config.probe_timeout)
            .with_contexts_root(strap.contexts_root().map(Path::to_path_buf));
        Self::with_probe(Arc::new(probe), strap, config)
    }

    /// Builds a dashboard over any probe. Used by tests with `FakeProbe`.
    pub fn with_probe(probe: Arc<dyn RepoProbe>, strap: StrapConfig, config: CacheConfig) -> Self {
        let builder = SnapshotBuilder::new(probe, strap, &config);
        Self {
            cache: Arc::new(RepoCache::new(builder)),
            config,
        }
    }

    pub fn strap(&self) -> &StrapConfig {
        self.cache.builder().strap()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<RepoCache> {
        &self.cache
    }

    /// Starts the fixed-cadence refresher. Dropping the handle stops it.
    pub fn start_refresher(&self) -> RefresherHandle {
        self.cache.spawn_refresher(self.config.refresh_interval)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Snapshot API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the cached snapshot, refreshing first when `force_refresh` is set.
    ///
    /// A forced refresh that finds a scan running waits for that scan rather
    /// than starting a second one.
    pub fn get_snapshot(&self, force_refresh: bool) -> CachedSnapshot {
        if force_refresh {
            self.cache.refresh_and_wait()
        } else {
            self.cache.read()
        }
    }

    /// Looks a record up in the current snapshot without probing.
    pub fn get_entity(&self, name: &str) -> Result<RepoRecord> {
        self.cache
            .read()
            .snapshot
            .find(name)
            .cloned()
            .ok_or_else(|| AllmindError::RepoNotFound(name.to_string()))
    }

    /// The cached record plus its memory documents, read now.
    pub fn get_entity_detail(&self, name: &str) -> Result<RepoDetail> {
        let repo = self.get_entity(name)?;
        let memory = if repo.exists {
            read_memory_docs(Path::new(&repo.path))
        } else {
            None
        };
        Ok(RepoDetail { repo, memory })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Shims & Registry API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn get_shim_report(&self) -> ShimReport {
        reconcile_shims(self.strap())
    }

    pub fn run_doctor(&self) -> DoctorReport {
        doctor::run_doctor(self.strap())
    }

    /// The raw registry document. Unlike the snapshot, an absent document is an error.
    pub fn get_registry(&self) -> Result<Registry> {
        let path = self.strap().registry_file();
        read_registry(path)?.ok_or_else(|| AllmindError::RegistryNotFound(path.to_path_buf()))
    }
}

/// Reads `docs/memory/*.md` under `repo_path`. `None` when the directory is
/// absent; a document that cannot be read is left out.
fn read_memory_docs(repo_path: &Path) -> Option<MemoryDocs> {
    let dir = MEMORY_DIR.iter().fold(repo_path.to_path_buf(), |p, c| p.join(c));
    if !dir.is_dir() {
        return None;
    }
    Some(MemoryDocs {
        state: read_optional(&dir.join(STATE_DOC)),
        constraints: read_optional(&dir.join(CONSTRAINTS_DOC)),
    })
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Skipping unreadable memory doc");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::test_utils::{FakeProbe, FakeRepo};
    use crate::types::GitState;
    use tempfile::TempDir;

    fn setup(registry: &str) -> (TempDir, Arc<FakeProbe>, Dashboard) {
        let temp = TempDir::new().unwrap();
        let strap = StrapConfig::with_root(temp.path().to_path_buf());
        std::fs::create_dir_all(strap.registry_file().parent().unwrap()).unwrap();
        std::fs::write(strap.registry_file(), registry).unwrap();
        let probe = Arc::new(FakeProbe::new());
        let dashboard = Dashboard::with_probe(probe.clone(), strap, CacheConfig::default());
        (temp, probe, dashboard)
    }

    #[test]
    fn get_snapshot_without_refresh_serves_placeholder() {
        let (_temp, _probe, dashboard) = setup(r#"{"repos": [{"name": "a"}]}"#);
        let snapshot = dashboard.get_snapshot(false);
        assert!(!snapshot.cached);
        assert!(snapshot.snapshot.repos.is_empty());
    }

    #[test]
    fn get_entity_reads_from_cache() {
        let (temp, probe, dashboard) = setup(r#"{"repos": [{"name": "a"}, {"name": "b"}]}"#);
        probe.add_repo(temp.path().join("a"), FakeRepo::on_branch("dev"));

        assert!(dashboard.get_entity("a").unwrap_err().is_not_found());

        dashboard.get_snapshot(true);
        let calls = probe.git_calls();
        let record = dashboard.get_entity("a").unwrap();
        assert_eq!(record.git.status().unwrap().branch, "dev");
        assert!(!dashboard.get_entity("b").unwrap().exists);
        assert_eq!(probe.git_calls(), calls);
    }

    #[test]
    fn get_entity_unknown_name_is_not_found() {
        let (_temp, _probe, dashboard) = setup(r#"{"repos": [{"name": "a"}]}"#);
        dashboard.get_snapshot(true);
        match dashboard.get_entity("zzz") {
            Err(AllmindError::RepoNotFound(name)) => assert_eq!(name, "zzz"),
            other => panic!("expected RepoNotFound, got {other:?}"),
        }
    }

    #[test]
    fn entity_detail_reads_memory_docs() {
        let (temp, probe, dashboard) = setup(r#"{"repos": [{"name": "a"}, {"name": "b"}]}"#);
        let memory = temp.path().join("a").join("docs").join("memory");
        std::fs::create_dir_all(&memory).unwrap();
        std::fs::write(memory.join("STATE.md"), "# State\n").unwrap();
        probe.add_repo(temp.path().join("a"), FakeRepo::default());
        std::fs::create_dir_all(temp.path().join("b")).unwrap();
        probe.add_repo(temp.path().join("b"), FakeRepo::default());
        dashboard.get_snapshot(true);

        let detail = dashboard.get_entity_detail("a").unwrap();
        let docs = detail.memory.unwrap();
        assert_eq!(docs.state.as_deref(), Some("# State\n"));
        assert_eq!(docs.constraints, None);
        assert!(matches!(detail.repo.git, GitState::Tracked(_)));

        assert_eq!(dashboard.get_entity_detail("b").unwrap().memory, None);
    }

    #[test]
    fn unreadable_memory_doc_degrades_to_none() {
        let (temp, probe, dashboard) = setup(r#"{"repos": [{"name": "a"}]}"#);
        let memory = temp.path().join("a").join("docs").join("memory");
        // A directory where the document should be fails to read as a file.
        std::fs::create_dir_all(memory.join("STATE.md")).unwrap();
        std::fs::write(memory.join("CONSTRAINTS.md"), "- no network\n").unwrap();
        probe.add_repo(temp.path().join("a"), FakeRepo::default());
        dashboard.get_snapshot(true);

        let docs = dashboard.get_entity_detail("a").unwrap().memory.unwrap();
        assert_eq!(docs.state, None);
        assert_eq!(docs.constraints.as_deref(), Some("- no network\n"));
    }

    #[test]
    fn get_registry_distinguishes_absent_document() {
        let (temp, _probe, dashboard) = setup(r#"{"repos": [{"name": "a"}]}"#);
        assert_eq!(dashboard.get_registry().unwrap().repos.len(), 1);

        std::fs::remove_file(temp.path().join("_strap").join("registry.json")).unwrap();
        assert!(matches!(
            dashboard.get_registry(),
            Err(AllmindError::RegistryNotFound(_))
        ));
    }

    #[test]
    fn shim_report_is_recomputed_per_call() {
        let (_temp, _probe, dashboard) = setup(r#"{"repos": [{"name": "a", "shims": ["foo"]}]}"#);
        let shims_dir = dashboard.strap().shims_dir().to_path_buf();
        assert!(dashboard.get_shim_report().error.is_some());

        std::fs::create_dir_all(&shims_dir).unwrap();
        std::fs::write(shims_dir.join("foo.ps1"), "# Repo: a\n").unwrap();
        std::fs::write(shims_dir.join("bar.ps1"), "# Repo: x\n").unwrap();

        let report = dashboard.get_shim_report();
        assert!(report.error.is_none());
        assert_eq!(report.orphans, vec!["bar"]);
    }
}
