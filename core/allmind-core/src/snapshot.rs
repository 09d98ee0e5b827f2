//! Snapshot Builder: one scan of the registry against live state.
//!
//! Entries are probed by a fixed pool of scoped workers, each pulling the
//! next unclaimed entry, so a slow or hung entry only occupies its own
//! worker and never delays the entries behind it. Failures stay local: a
//! failed git probe becomes `GitState::Error` on that record, failed
//! tooling/history/ingestion probes become empty defaults, and even a
//! panicking probe only costs its own entry. A panic inside the existence
//! check leaves `exists` false, since existence was never established. The
//! one whole-scan failure (unreadable registry) degrades to an empty
//! snapshot carrying `registry_error`.

use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, StrapConfig};
use crate::error::ProbeError;
use crate::probes::RepoProbe;
use crate::registry::load_registry;
use crate::types::{GitState, RegistryEntry, RepoRecord, Snapshot, ToolMarkers};

/// Upper bound on entries probed at once.
const MAX_PARALLEL_ENTRIES: usize = 16;

pub struct SnapshotBuilder {
    probe: Arc<dyn RepoProbe>,
    strap: StrapConfig,
    history_limit: usize,
}

impl SnapshotBuilder {
    pub fn new(probe: Arc<dyn RepoProbe>, strap: StrapConfig, config: &CacheConfig) -> Self {
        Self {
            probe,
            strap,
            history_limit: config.history_limit,
        }
    }

    pub fn strap(&self) -> &StrapConfig {
        &self.strap
    }

    /// Reads the registry and builds a complete snapshot. Never fails.
    pub fn build(&self, generation: u64) -> Snapshot {
        let started = Instant::now();
        let registry_path = self.strap.registry_file();

        let (entries, registry_error) = match load_registry(registry_path) {
            Ok(registry) => {
                if registry.repos.is_empty() {
                    warn!(path = %registry_path.display(), "No repos found in registry");
                }
                (registry.repos, None)
            }
            Err(err) => {
                warn!(error = %err, "Failed to read registry; publishing empty snapshot");
                (Vec::new(), Some(err.to_string()))
            }
        };

        let repos = self.build_records(&entries);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let snapshot = Snapshot {
            generation,
            count: repos.len(),
            repos,
            root: self.strap.root().display().to_string(),
            completed_at: Some(Utc::now()),
            duration_ms,
            registry_error,
        };

        let summary = snapshot.summary();
        info!(
            generation,
            count = summary.total,
            missing = summary.missing,
            git_errors = summary.git_errors,
            duration_ms,
            "Repo snapshot built"
        );
        snapshot
    }

    /// Builds one record per entry, preserving registry order.
    pub fn build_records(&self, entries: &[RegistryEntry]) -> Vec<RepoRecord> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<RepoRecord>>> =
            entries.iter().map(|_| Mutex::new(None)).collect();
        let workers = entries.len().min(MAX_PARALLEL_ENTRIES);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(entry) = entries.get(index) else {
                        break;
                    };
                    let record = self.build_record(entry);
                    *slots[index]
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(record);
                });
            }
        });

        slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.into_inner()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .unwrap_or_else(|| {
                        let path = self.entry_path(entry);
                        let err = ProbeError::Panicked("entry was never probed".to_string());
                        failed_record(entry, &path, false, &err)
                    })
            })
            .collect()
    }

    /// Probes a single entry. A missing path short-circuits to the
    /// not-found record; no other probe runs for it. Never panics.
    pub fn build_record(&self, entry: &RegistryEntry) -> RepoRecord {
        let path = self.entry_path(entry);

        let exists = match panic::catch_unwind(AssertUnwindSafe(|| self.probe.path_exists(&path)))
        {
            Ok(exists) => exists,
            Err(panic) => return panicked_record(entry, &path, false, panic),
        };
        if !exists {
            debug!(repo = %entry.name, path = %path.display(), "Repo path does not exist");
            return missing_record(entry, &path);
        }

        panic::catch_unwind(AssertUnwindSafe(|| self.probe_existing(entry, &path)))
            .unwrap_or_else(|panic| panicked_record(entry, &path, true, panic))
    }

    fn entry_path(&self, entry: &RegistryEntry) -> PathBuf {
        self.strap
            .resolve_repo_path(&entry.name, entry.repo_path.as_deref())
    }

    /// Runs every probe after the existence check has passed.
    fn probe_existing(&self, entry: &RegistryEntry, path: &Path) -> RepoRecord {
        let mut record = missing_record(entry, path);
        record.exists = true;

        record.git = match self.probe.git_status(path) {
            Ok(Some(status)) => GitState::Tracked(status),
            Ok(None) => GitState::NotARepository,
            Err(err) => {
                debug!(repo = %entry.name, error = %err, "Git probe failed");
                GitState::Error {
                    error: err.to_string(),
                }
            }
        };

        record.tools = self
            .probe
            .tool_markers(path)
            .unwrap_or_else(|err| quiet_default(&entry.name, "tooling", err));

        record.test_command = self
            .probe
            .test_command(path, &record.tools)
            .unwrap_or_else(|err| quiet_default(&entry.name, "test-command", err));

        record.recent_commits = self
            .probe
            .recent_commits(path, self.history_limit)
            .unwrap_or_else(|err| quiet_default(&entry.name, "history", err));
        record.recent_commits.truncate(self.history_limit);

        record.ingestion = self
            .probe
            .ingestion_status(&entry.name, path)
            .unwrap_or_else(|err| quiet_default(&entry.name, "ingestion", err));

        record
    }
}

fn panicked_record(
    entry: &RegistryEntry,
    path: &Path,
    exists: bool,
    panic: Box<dyn Any + Send>,
) -> RepoRecord {
    let err = ProbeError::Panicked(panic_message(panic.as_ref()));
    warn!(repo = %entry.name, error = %err, "Repo probe panicked");
    failed_record(entry, path, exists, &err)
}

fn failed_record(entry: &RegistryEntry, path: &Path, exists: bool, err: &ProbeError) -> RepoRecord {
    RepoRecord {
        exists,
        git: GitState::Error {
            error: err.to_string(),
        },
        ..missing_record(entry, path)
    }
}

/// The record for an entry whose path is absent: sentinel git state,
/// every tooling flag false, no history.
fn missing_record(entry: &RegistryEntry, path: &Path) -> RepoRecord {
    RepoRecord {
        name: entry.name.clone(),
        id: entry.id.clone(),
        scope: entry.scope.clone(),
        tags: entry.tags.clone(),
        status: entry.status.clone(),
        path: path.display().to_string(),
        exists: false,
        shim_count: entry.shim_bindings().len(),
        created_at: entry.created_at.clone(),
        updated_at: entry.updated_at.clone(),
        git: GitState::PathNotFound,
        tools: ToolMarkers::default(),
        test_command: None,
        recent_commits: Vec::new(),
        ingestion: None,
    }
}

fn quiet_default<T: Default>(repo: &str, probe: &str, err: ProbeError) -> T {
    debug!(repo, probe, error = %err, "Probe failed; using empty default");
    T::default()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
