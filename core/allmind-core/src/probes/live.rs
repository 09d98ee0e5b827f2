//! Live probe: filesystem checks plus the `git` CLI.

use chrono::{DateTime, Utc};
use fs_err as fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command;
use super::RepoProbe;
use crate::error::ProbeError;
use crate::types::{CommitSummary, GitStatus, IngestionStatus, ToolMarkers};

/// Field separator for `git log --format`; never appears in commit subjects.
const LOG_FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%aI%x1f%s";

/// Relative paths whose presence sets each tooling flag.
const CLAUDE_PROJECT_MARKER: &str = ".claude";
const VENV_MARKERS: &[&str] = &[".venv", "venv"];
const NODE_MARKER: &str = "package.json";
const PYTHON_MARKER: &str = "pyproject.toml";
const MEMORY_STATE_DOC: &[&str] = &["docs", "memory", "STATE.md"];
const TESTS_DIR: &str = "tests";

pub struct LiveProbe {
    timeout: Duration,
    contexts_root: Option<PathBuf>,
}

impl LiveProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            contexts_root: None,
        }
    }

    /// Enables the ingestion probe, reading `<root>/<name>/status.json`.
    pub fn with_contexts_root(mut self, root: Option<PathBuf>) -> Self {
        self.contexts_root = root;
        self
    }

    fn git(&self, path: &Path, args: &[&str]) -> Result<String, ProbeError> {
        command::run("git", args, path, self.timeout)
    }

    fn ahead_behind(&self, path: &Path, branch: &str) -> (u32, u32) {
        let range = format!("origin/{branch}...HEAD");
        self.git(path, &["rev-list", "--left-right", "--count", &range])
            .ok()
            .and_then(|out| parse_left_right(&out))
            .map(|(behind, ahead)| (ahead, behind))
            .unwrap_or((0, 0))
    }
}

impl RepoProbe for LiveProbe {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn git_status(&self, path: &Path) -> Result<Option<GitStatus>, ProbeError> {
        if !path.join(".git").exists() {
            return Ok(None);
        }

        let porcelain = self.git(path, &["status", "--porcelain"])?;
        let branch = self.git(path, &["branch", "--show-current"])?;
        let remotes = self.git(path, &["remote", "-v"])?;

        let branch = if branch.is_empty() {
            "unknown".to_string()
        } else {
            branch
        };
        // No upstream to compare against for a detached HEAD.
        let (ahead, behind) = if branch == "unknown" {
            (0, 0)
        } else {
            self.ahead_behind(path, &branch)
        };

        Ok(Some(GitStatus {
            dirty: !porcelain.is_empty(),
            branch,
            ahead,
            behind,
            remotes: remotes.lines().map(str::to_string).collect(),
        }))
    }

    fn tool_markers(&self, path: &Path) -> Result<ToolMarkers, ProbeError> {
        let memory_doc = MEMORY_STATE_DOC
            .iter()
            .fold(path.to_path_buf(), |acc, part| acc.join(part));
        Ok(ToolMarkers {
            claude_project: path.join(CLAUDE_PROJECT_MARKER).exists(),
            venv: VENV_MARKERS.iter().any(|m| path.join(m).exists()),
            node: path.join(NODE_MARKER).exists(),
            python: path.join(PYTHON_MARKER).exists(),
            memory: memory_doc.exists(),
        })
    }

    fn test_command(
        &self,
        path: &Path,
        markers: &ToolMarkers,
    ) -> Result<Option<String>, ProbeError> {
        if markers.node && package_has_test_script(&path.join(NODE_MARKER)) {
            return Ok(Some("npm test".to_string()));
        }
        if markers.python || path.join(TESTS_DIR).is_dir() {
            return Ok(Some("pytest".to_string()));
        }
        Ok(None)
    }

    fn recent_commits(
        &self,
        path: &Path,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, ProbeError> {
        if limit == 0 || !path.join(".git").exists() {
            return Ok(Vec::new());
        }
        let count = limit.to_string();
        let out = self.git(path, &["log", "-n", &count, LOG_FORMAT])?;
        Ok(parse_log(&out))
    }

    fn ingestion_status(
        &self,
        name: &str,
        _path: &Path,
    ) -> Result<Option<IngestionStatus>, ProbeError> {
        let Some(root) = &self.contexts_root else {
            return Ok(None);
        };
        let status_path = root.join(name).join("status.json");
        let content = match fs::read_to_string(&status_path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ProbeError::io("reading ingestion status", &err)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| ProbeError::Parse {
                command: status_path.display().to_string(),
                details: err.to_string(),
            })
    }
}

fn package_has_test_script(manifest: &Path) -> bool {
    fs::read_to_string(manifest)
        .ok()
        .and_then(|c| serde_json::from_str::<serde_json::Value>(&c).ok())
        .and_then(|pkg| {
            pkg.get("scripts")
                .and_then(|s| s.get("test"))
                .and_then(|t| t.as_str())
                .map(|t| !t.trim().is_empty())
        })
        .unwrap_or(false)
}

/// Parses `git rev-list --left-right --count` output: `<left>\t<right>`.
fn parse_left_right(out: &str) -> Option<(u32, u32)> {
    let mut parts = out.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    Some((left, right))
}

fn parse_log(out: &str) -> Vec<CommitSummary> {
    out.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.splitn(4, LOG_FIELD_SEP);
            let hash = fields.next()?.trim().to_string();
            let author = fields.next().unwrap_or_default().to_string();
            let timestamp = fields
                .next()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            let message = fields.next().unwrap_or_default().to_string();
            if hash.is_empty() {
                return None;
            }
            Some(CommitSummary {
                hash,
                author,
                timestamp,
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn probe() -> LiveProbe {
        LiveProbe::new(Duration::from_secs(10))
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    #[test]
    fn markers_reflect_files_on_disk() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir(root.join(".claude")).unwrap();
        std::fs::create_dir(root.join("venv")).unwrap();
        std::fs::write(root.join("pyproject.toml"), "[project]\n").unwrap();
        std::fs::create_dir_all(root.join("docs/memory")).unwrap();
        std::fs::write(root.join("docs/memory/STATE.md"), "# State\n").unwrap();

        let markers = probe().tool_markers(root).unwrap();
        assert_eq!(
            markers,
            ToolMarkers {
                claude_project: true,
                venv: true,
                node: false,
                python: true,
                memory: true,
            }
        );
    }

    #[test]
    fn test_command_prefers_npm_when_script_defined() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(
            root.join("package.json"),
            r#"{"scripts": {"test": "vitest"}}"#,
        )
        .unwrap();
        std::fs::write(root.join("pyproject.toml"), "").unwrap();

        let p = probe();
        let markers = p.tool_markers(root).unwrap();
        assert_eq!(
            p.test_command(root, &markers).unwrap().as_deref(),
            Some("npm test")
        );
    }

    #[test]
    fn test_command_falls_back_to_pytest_for_tests_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("package.json"), r#"{"scripts": {}}"#).unwrap();
        std::fs::create_dir(root.join("tests")).unwrap();

        let p = probe();
        let markers = p.tool_markers(root).unwrap();
        assert_eq!(
            p.test_command(root, &markers).unwrap().as_deref(),
            Some("pytest")
        );
    }

    #[test]
    fn test_command_ignores_malformed_package_json() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("package.json"), "{ nope").unwrap();

        let p = probe();
        let markers = p.tool_markers(root).unwrap();
        assert_eq!(p.test_command(root, &markers).unwrap(), None);
    }

    #[test]
    fn non_git_directory_has_no_status() {
        let temp = TempDir::new().unwrap();
        assert_eq!(probe().git_status(temp.path()).unwrap(), None);
        assert!(probe().recent_commits(temp.path(), 10).unwrap().is_empty());
    }

    #[test]
    fn git_status_and_history_for_real_repo() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        git(root, &["init", "-q"]);
        git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(root, &["config", "commit.gpgsign", "false"]);
        std::fs::write(root.join("README.md"), "hi\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "first commit"]);
        std::fs::write(root.join("README.md"), "changed\n").unwrap();
        git(root, &["commit", "-q", "-am", "second commit"]);

        let status = probe().git_status(root).unwrap().unwrap();
        assert_eq!(status.branch, "main");
        assert!(!status.dirty);
        assert_eq!((status.ahead, status.behind), (0, 0));
        assert!(status.remotes.is_empty());

        std::fs::write(root.join("new.txt"), "x").unwrap();
        assert!(probe().git_status(root).unwrap().unwrap().dirty);

        let commits = probe().recent_commits(root, 1).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "second commit");
        assert_eq!(commits[0].author, "Test");
        assert!(commits[0].timestamp.is_some());
    }

    #[test]
    fn ingestion_status_reads_context_document() {
        let temp = TempDir::new().unwrap();
        let ctx = temp.path().join("tool");
        std::fs::create_dir_all(&ctx).unwrap();
        std::fs::write(
            ctx.join("status.json"),
            r#"{"status": "ready", "label": "Indexed", "processedCount": 42}"#,
        )
        .unwrap();

        let p = probe().with_contexts_root(Some(temp.path().to_path_buf()));
        let status = p.ingestion_status("tool", temp.path()).unwrap().unwrap();
        assert_eq!(status.status, "ready");
        assert_eq!(status.processed_count, 42);
        assert_eq!(p.ingestion_status("other", temp.path()).unwrap(), None);
        assert_eq!(probe().ingestion_status("tool", temp.path()).unwrap(), None);
    }

    #[test]
    fn parse_log_splits_fields() {
        let out = format!(
            "abc{0}Ada{0}2025-03-01T10:00:00+02:00{0}fix: a | b\n\ndef{0}Bob{0}garbage{0}init",
            LOG_FIELD_SEP
        );
        let commits = parse_log(&out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "fix: a | b");
        assert_eq!(
            commits[0].timestamp.unwrap().to_rfc3339(),
            "2025-03-01T08:00:00+00:00"
        );
        assert_eq!(commits[1].timestamp, None);
    }

    #[test]
    fn parse_left_right_reads_tab_separated_counts() {
        assert_eq!(parse_left_right("3\t5"), Some((3, 5)));
        assert_eq!(parse_left_right(""), None);
    }
}
