//! Health checks over the strap layout.
//!
//! | ID        | Severity | Passes when                                      |
//! |-----------|----------|--------------------------------------------------|
//! | `SHIM001` | critical | shims directory exists and is on `PATH`          |
//! | `SHIM002` | error    | registry document exists                         |
//! | `SHIM008` | warning  | emitted once per launcher missing its `.cmd` pair |
//!
//! `SHIM008` only appears for failing launchers, so a clean install reports
//! two checks.

use serde_json::json;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::StrapConfig;
use crate::shims::{enumerate_artifacts, COMPANION_EXTENSION};
use crate::types::{DoctorCheck, DoctorReport, DoctorSummary, Severity};

/// Runs every check against the current process `PATH`.
pub fn run_doctor(strap: &StrapConfig) -> DoctorReport {
    run_doctor_with_path(strap, env::var_os("PATH").as_deref())
}

/// Runs every check against an explicit `PATH` value.
pub fn run_doctor_with_path(strap: &StrapConfig, path_var: Option<&OsStr>) -> DoctorReport {
    let mut checks = Vec::new();
    let shims_dir = strap.shims_dir();

    let shims_exist = shims_dir.is_dir();
    let on_path = path_var.is_some_and(|value| path_contains(value, shims_dir));
    checks.push(DoctorCheck {
        id: "SHIM001",
        name: "Shims directory on PATH".to_string(),
        passed: shims_exist && on_path,
        severity: Severity::Critical,
        details: json!({
            "exists": shims_exist,
            "onPath": on_path,
            "path": shims_dir.display().to_string(),
        }),
    });

    let registry_file = strap.registry_file();
    checks.push(DoctorCheck {
        id: "SHIM002",
        name: "Strap registry exists".to_string(),
        passed: registry_file.is_file(),
        severity: Severity::Error,
        details: json!({ "path": registry_file.display().to_string() }),
    });

    if shims_exist {
        match enumerate_artifacts(shims_dir) {
            Ok(artifacts) => {
                checks.extend(artifacts.iter().filter(|a| !a.companion_exists).map(|a| {
                    DoctorCheck {
                        id: "SHIM008",
                        name: format!("Launcher pair: {}", a.name),
                        passed: false,
                        severity: Severity::Warning,
                        details: json!({ "missing": format!("{}.{COMPANION_EXTENSION}", a.name) }),
                    }
                }));
            }
            Err(err) => {
                debug!(error = %err, "Skipping launcher pair checks");
            }
        }
    }

    let passed = checks.iter().filter(|c| c.passed).count();
    DoctorReport {
        summary: DoctorSummary {
            passed,
            failed: checks.len() - passed,
            total: checks.len(),
        },
        checks,
    }
}

fn path_contains(path_var: &OsStr, dir: &Path) -> bool {
    let wanted = normalize(dir);
    env::split_paths(path_var).any(|entry| normalize(&entry) == wanted)
}

/// Trailing separators are ignored; Windows paths compare case-insensitively.
fn normalize(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    let trimmed = text.trim_end_matches(['/', '\\']);
    if cfg!(windows) {
        PathBuf::from(trimmed.to_lowercase())
    } else {
        PathBuf::from(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> (TempDir, StrapConfig) {
        let temp = TempDir::new().unwrap();
        let strap = StrapConfig::with_root(temp.path().to_path_buf());
        (temp, strap)
    }

    fn path_with(dir: &Path) -> std::ffi::OsString {
        env::join_paths([PathBuf::from("/usr/bin"), dir.to_path_buf()]).unwrap()
    }

    fn check<'a>(report: &'a DoctorReport, id: &str) -> Vec<&'a DoctorCheck> {
        report.checks.iter().filter(|c| c.id == id).collect()
    }

    #[test]
    fn fresh_layout_fails_both_core_checks() {
        let (_temp, strap) = layout();
        let report = run_doctor_with_path(&strap, None);

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 2);
        let shim001 = check(&report, "SHIM001")[0];
        assert_eq!(shim001.severity, Severity::Critical);
        assert_eq!(shim001.details["exists"], false);
        assert_eq!(shim001.details["onPath"], false);
    }

    #[test]
    fn healthy_layout_passes() {
        let (_temp, strap) = layout();
        std::fs::create_dir_all(strap.shims_dir()).unwrap();
        std::fs::create_dir_all(strap.registry_file().parent().unwrap()).unwrap();
        std::fs::write(strap.registry_file(), r#"{"repos": []}"#).unwrap();
        std::fs::write(strap.shims_dir().join("foo.ps1"), "# Repo: a\n").unwrap();
        std::fs::write(strap.shims_dir().join("foo.cmd"), "@echo off\n").unwrap();

        let path_var = path_with(strap.shims_dir());
        let report = run_doctor_with_path(&strap, Some(&path_var));

        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 0);
        assert!(check(&report, "SHIM008").is_empty());
    }

    #[test]
    fn path_match_ignores_trailing_separator() {
        let (_temp, strap) = layout();
        std::fs::create_dir_all(strap.shims_dir()).unwrap();
        let with_slash = format!("{}/", strap.shims_dir().display());

        let path_var = path_with(Path::new(&with_slash));
        let report = run_doctor_with_path(&strap, Some(&path_var));
        assert!(check(&report, "SHIM001")[0].passed);
    }

    #[test]
    fn existing_dir_off_path_still_fails() {
        let (_temp, strap) = layout();
        std::fs::create_dir_all(strap.shims_dir()).unwrap();
        let path_var = path_with(Path::new("/opt/elsewhere"));

        let report = run_doctor_with_path(&strap, Some(&path_var));
        let shim001 = check(&report, "SHIM001")[0];
        assert!(!shim001.passed);
        assert_eq!(shim001.details["exists"], true);
    }

    #[test]
    fn each_unpaired_launcher_gets_a_warning() {
        let (_temp, strap) = layout();
        std::fs::create_dir_all(strap.shims_dir()).unwrap();
        for name in ["alpha", "beta"] {
            std::fs::write(strap.shims_dir().join(format!("{name}.ps1")), "").unwrap();
        }
        std::fs::write(strap.shims_dir().join("beta.cmd"), "").unwrap();

        let report = run_doctor_with_path(&strap, None);
        let warnings = check(&report, "SHIM008");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "Launcher pair: alpha");
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert_eq!(warnings[0].details["missing"], "alpha.cmd");
        assert_eq!(report.summary.total, 3);
    }
}
