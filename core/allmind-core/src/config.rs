//! Path layout and tunables for the dashboard.
//!
//! `StrapConfig` is the single source of truth for where the strap registry,
//! shim launchers and ingestion contexts live. Production code uses
//! `StrapConfig::from_env()`; tests use `StrapConfig::with_root(temp_dir)`.
//!
//! ## Environment
//!
//! | Variable                     | Default                         |
//! |------------------------------|---------------------------------|
//! | `STRAP_ROOT`                 | `~/software`                    |
//! | `STRAP_REGISTRY`             | `<root>/_strap/registry.json`   |
//! | `SHIMS_DIR`                  | `<root>/bin`                    |
//! | `ALLMIND_CONTEXTS_ROOT`      | unset (ingestion probe disabled)|
//! | `ALLMIND_REFRESH_SECS`       | `30`                            |
//! | `ALLMIND_PROBE_TIMEOUT_SECS` | `10`                            |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REFRESH_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Filesystem layout of the strap tool this dashboard observes.
#[derive(Debug, Clone)]
pub struct StrapConfig {
    /// Directory repositories are cloned under when `repoPath` is absent.
    root: PathBuf,
    registry_file: PathBuf,
    shims_dir: PathBuf,
    /// Root of per-repo ingestion status documents, if the indexer is in use.
    contexts_root: Option<PathBuf>,
}

impl Default for StrapConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_root(home.join("software"))
    }
}

impl StrapConfig {
    /// Derives every path from a single strap root.
    pub fn with_root(root: PathBuf) -> Self {
        let strap_dir = root.join("_strap");
        Self {
            registry_file: strap_dir.join("registry.json"),
            shims_dir: root.join("bin"),
            contexts_root: None,
            root,
        }
    }

    /// Reads overrides from the environment, filling the rest from defaults.
    pub fn from_env() -> Self {
        let mut config = match env::var_os("STRAP_ROOT") {
            Some(root) => Self::with_root(PathBuf::from(root)),
            None => Self::default(),
        };
        if let Some(path) = env::var_os("STRAP_REGISTRY") {
            config.registry_file = PathBuf::from(path);
        }
        if let Some(path) = env::var_os("SHIMS_DIR") {
            config.shims_dir = PathBuf::from(path);
        }
        config.contexts_root = env::var_os("ALLMIND_CONTEXTS_ROOT").map(PathBuf::from);
        config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to registry.json (repos and their shim bindings).
    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    /// Directory holding `<name>.ps1` / `<name>.cmd` launcher pairs.
    pub fn shims_dir(&self) -> &Path {
        &self.shims_dir
    }

    pub fn contexts_root(&self) -> Option<&Path> {
        self.contexts_root.as_deref()
    }

    /// Resolves where a registry entry lives on disk.
    pub fn resolve_repo_path(&self, name: &str, declared: Option<&str>) -> PathBuf {
        match declared {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => self.root.join(name),
        }
    }
}

/// Tunables for the reconciliation cache and its probes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Fixed cadence of background refreshes.
    pub refresh_interval: Duration,
    /// Upper bound on commits collected per repo.
    pub history_limit: usize,
    /// Wall-clock bound on any single external command.
    pub probe_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            history_limit: DEFAULT_HISTORY_LIMIT,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            refresh_interval: secs_from_env("ALLMIND_REFRESH_SECS")
                .unwrap_or(defaults.refresh_interval),
            probe_timeout: secs_from_env("ALLMIND_PROBE_TIMEOUT_SECS")
                .unwrap_or(defaults.probe_timeout),
            history_limit: defaults.history_limit,
        }
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid duration override");
            None
        }
    }
}
