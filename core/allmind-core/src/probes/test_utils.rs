//! Scriptable probe for unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::RepoProbe;
use crate::error::ProbeError;
use crate::types::{CommitSummary, GitStatus, IngestionStatus, ToolMarkers};

/// Scripted state for one fake repository.
#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub git: Result<Option<GitStatus>, ProbeError>,
    pub markers: Result<ToolMarkers, ProbeError>,
    pub test_command: Option<String>,
    pub commits: Result<Vec<CommitSummary>, ProbeError>,
    pub ingestion: Option<IngestionStatus>,
    pub panic_on_git: bool,
    pub panic_on_exists: bool,
}

impl Default for FakeRepo {
    fn default() -> Self {
        Self {
            git: Ok(Some(GitStatus {
                branch: "main".to_string(),
                ..GitStatus::default()
            })),
            markers: Ok(ToolMarkers::default()),
            test_command: None,
            commits: Ok(Vec::new()),
            ingestion: None,
            panic_on_git: false,
            panic_on_exists: false,
        }
    }
}

impl FakeRepo {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            git: Ok(Some(GitStatus {
                branch: branch.to_string(),
                ..GitStatus::default()
            })),
            ..Self::default()
        }
    }

    pub fn failing_git(message: &str) -> Self {
        Self {
            git: Err(ProbeError::Spawn {
                command: "git status --porcelain".to_string(),
                details: message.to_string(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Gate {
    closed: bool,
    held_paths: HashSet<PathBuf>,
    blocked: usize,
}

/// In-memory probe: a path "exists" iff it was registered with `add_repo`.
///
/// `hold()` parks every `git_status` call until `release()`, letting tests
/// keep a scan in flight deterministically. `hold_path()` parks only the
/// calls for one path.
#[derive(Default)]
pub struct FakeProbe {
    repos: Mutex<HashMap<PathBuf, FakeRepo>>,
    git_calls: AtomicUsize,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repo(&self, path: impl Into<PathBuf>, repo: FakeRepo) {
        self.repos.lock().unwrap().insert(path.into(), repo);
    }

    /// Total `git_status` calls so far, across all paths.
    pub fn git_calls(&self) -> usize {
        self.git_calls.load(Ordering::SeqCst)
    }

    pub fn hold(&self) {
        self.gate.lock().unwrap().closed = true;
    }

    pub fn release(&self) {
        self.gate.lock().unwrap().closed = false;
        self.gate_changed.notify_all();
    }

    pub fn hold_path(&self, path: impl Into<PathBuf>) {
        self.gate.lock().unwrap().held_paths.insert(path.into());
    }

    pub fn release_path(&self, path: &Path) {
        self.gate.lock().unwrap().held_paths.remove(path);
        self.gate_changed.notify_all();
    }

    /// Waits until at least `count` probe calls are parked at the gate.
    pub fn wait_blocked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.gate.lock().unwrap();
        while gate.blocked < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            gate = self.gate_changed.wait_timeout(gate, deadline - now).unwrap().0;
        }
        true
    }

    fn pass_gate(&self, path: &Path) {
        let parked = |gate: &Gate| gate.closed || gate.held_paths.contains(path);
        let mut gate = self.gate.lock().unwrap();
        if !parked(&*gate) {
            return;
        }
        gate.blocked += 1;
        self.gate_changed.notify_all();
        while parked(&*gate) {
            gate = self.gate_changed.wait(gate).unwrap();
        }
        gate.blocked -= 1;
    }

    fn repo(&self, path: &Path) -> FakeRepo {
        self.repos
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

impl RepoProbe for FakeProbe {
    fn path_exists(&self, path: &Path) -> bool {
        let repo = self.repos.lock().unwrap().get(path).cloned();
        match repo {
            Some(repo) if repo.panic_on_exists => {
                panic!("scripted existence probe panic for {}", path.display())
            }
            Some(_) => true,
            None => false,
        }
    }

    fn git_status(&self, path: &Path) -> Result<Option<GitStatus>, ProbeError> {
        self.git_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate(path);
        let repo = self.repo(path);
        if repo.panic_on_git {
            panic!("scripted git probe panic for {}", path.display());
        }
        repo.git
    }

    fn tool_markers(&self, path: &Path) -> Result<ToolMarkers, ProbeError> {
        self.repo(path).markers
    }

    fn test_command(
        &self,
        path: &Path,
        _markers: &ToolMarkers,
    ) -> Result<Option<String>, ProbeError> {
        Ok(self.repo(path).test_command)
    }

    fn recent_commits(
        &self,
        path: &Path,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, ProbeError> {
        self.repo(path).commits.map(|mut commits| {
            commits.truncate(limit);
            commits
        })
    }

    fn ingestion_status(
        &self,
        _name: &str,
        path: &Path,
    ) -> Result<Option<IngestionStatus>, ProbeError> {
        Ok(self.repo(path).ingestion)
    }
}
