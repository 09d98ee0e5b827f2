//! Shim Reconciler: on-disk launchers versus registry-declared ownership.
//!
//! strap generates a `<name>.ps1` launcher (plus a `<name>.cmd` companion)
//! per shim, stamping ownership into header comments:
//!
//! ```text
//! # Repo: my-tool | generated by strap
//! # Type: python
//! # Venv: P:\software\my-tool\.venv
//! $exe = "P:\software\my-tool\.venv\Scripts\my-tool.exe"
//! ```
//!
//! Each call recomputes the report from scratch; nothing is cached. Ownership
//! is first-claim-wins in registry order, and every later claim on the same
//! name is reported as a collision rather than overwriting the owner.

use fs_err as fs;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::StrapConfig;
use crate::error::AllmindError;
use crate::registry::load_registry;
use crate::types::{CollisionRecord, Registry, ShimArtifact, ShimReport, UNKNOWN};

pub const SCRIPT_EXTENSION: &str = "ps1";
pub const COMPANION_EXTENSION: &str = "cmd";

static RE_SHIM_REPO: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*Repo:\s*([^\s|]+)").unwrap());
static RE_SHIM_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*Type:\s*(\w+)").unwrap());
static RE_SHIM_VENV: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*Venv:\s*(\S+)").unwrap());
static RE_SHIM_EXE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\$exe\s*=\s*"([^"]+)""#).unwrap());

/// Metadata strap embeds in a launcher script. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShimMetadata {
    pub repo: Option<String>,
    pub kind: Option<String>,
    pub venv: Option<String>,
    pub exe: Option<String>,
}

impl ShimMetadata {
    pub fn parse(content: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        Self {
            repo: capture(&RE_SHIM_REPO),
            kind: capture(&RE_SHIM_TYPE),
            venv: capture(&RE_SHIM_VENV),
            exe: capture(&RE_SHIM_EXE),
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        // Lossy: launchers written by older PowerShell may carry a BOM or ANSI bytes.
        let bytes = fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }
}

/// Loads the registry and reconciles it against the configured shims directory.
pub fn reconcile_shims(strap: &StrapConfig) -> ShimReport {
    match load_registry(strap.registry_file()) {
        Ok(registry) => reconcile(&registry, strap.shims_dir()),
        Err(err) => {
            warn!(error = %err, "Registry unreadable; shim ownership unknown");
            let mut report = reconcile(&Registry::default(), strap.shims_dir());
            // Without ownership data every launcher would look orphaned.
            report.orphans.clear();
            if report.error.is_none() {
                report.error = Some(err.to_string());
            }
            report
        }
    }
}

/// Classifies every launcher in `shims_dir` against `registry`.
pub fn reconcile(registry: &Registry, shims_dir: &Path) -> ShimReport {
    let artifacts = match enumerate_artifacts(shims_dir) {
        Ok(artifacts) => artifacts,
        Err(err) => {
            warn!(path = %shims_dir.display(), error = %err, "Cannot enumerate shims");
            let error = if err.kind() == ErrorKind::NotFound {
                format!("Shims directory not found: {}", shims_dir.display())
            } else {
                AllmindError::ShimDirUnreadable {
                    path: shims_dir.to_path_buf(),
                    source: err,
                }
                .to_string()
            };
            return ShimReport {
                error: Some(error),
                ..ShimReport::default()
            };
        }
    };

    let (owners, collisions) = ownership(registry);
    let orphans = artifacts
        .iter()
        .filter(|artifact| !owners.contains_key(&artifact.name))
        .map(|artifact| artifact.name.clone())
        .collect();

    ShimReport {
        artifacts,
        collisions,
        orphans,
        error: None,
    }
}

/// Builds `shim name -> owner of record` plus one collision per contested name.
pub fn ownership(registry: &Registry) -> (HashMap<String, String>, Vec<CollisionRecord>) {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut collisions: Vec<CollisionRecord> = Vec::new();
    let mut collision_index: HashMap<String, usize> = HashMap::new();

    for entry in &registry.repos {
        for binding in entry.shim_bindings() {
            let Some(owner) = owners.get(&binding.name) else {
                owners.insert(binding.name.clone(), entry.name.clone());
                continue;
            };
            if owner == &entry.name {
                continue;
            }

            let index = *collision_index
                .entry(binding.name.clone())
                .or_insert_with(|| {
                    collisions.push(CollisionRecord {
                        shim: binding.name.clone(),
                        owners: vec![owner.clone()],
                    });
                    collisions.len() - 1
                });
            let record = &mut collisions[index];
            if !record.owners.contains(&entry.name) {
                record.owners.push(entry.name.clone());
            }
        }
    }

    (owners, collisions)
}

/// Lists launcher scripts in `dir`, sorted by shim name.
///
/// An unreadable launcher yields an artifact with unknown metadata and an
/// `error`; it never aborts the listing.
pub fn enumerate_artifacts(dir: &Path) -> std::io::Result<Vec<ShimArtifact>> {
    let mut artifacts = Vec::new();
    let mut seen = HashSet::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "Skipping unreadable shims directory entry");
                continue;
            }
        };
        let path = entry.path();
        let is_script = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION));
        if !is_script || path.is_dir() {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            continue;
        }

        let companion = dir.join(format!("{name}.{COMPANION_EXTENSION}"));
        let (metadata, error) = match ShimMetadata::read(&path) {
            Ok(metadata) => (metadata, None),
            Err(err) => {
                debug!(shim = %name, error = %err, "Failed to read shim launcher");
                (ShimMetadata::default(), Some(err.to_string()))
            }
        };

        artifacts.push(ShimArtifact {
            script_path: path.display().to_string(),
            companion_exists: companion.exists(),
            repo: metadata.repo.unwrap_or_else(|| UNKNOWN.to_string()),
            kind: metadata.kind.unwrap_or_else(|| UNKNOWN.to_string()),
            venv: metadata.venv,
            exe: metadata.exe,
            error,
            name,
        });
    }

    artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(artifacts)
}
