//! Local working copy inspection through the `git` command line.
//!
//! Nothing here touches the network. Every failure is folded into the
//! returned [`LocalSnapshot`] instead of being raised.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{TimeZone, Utc};
use tracing::debug;

use crate::domain::{CommitInfo, LocalRepositoryError, LocalSnapshot};

/// File names accepted as a local roadmap, checked in order.
pub const ROADMAP_VARIANTS: [&str; 3] = ["ROADMAP.md", "roadmap.md", "Roadmap.md"];

const FIELD_SEP: char = '\u{1f}';

/// Reads the state of one local working copy.
///
/// Implementations are blocking; the aggregator runs them on a bounded pool.
pub trait LocalInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> LocalSnapshot;
}

/// [`LocalInspector`] backed by the `git` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitInspector;

impl LocalInspector for GitInspector {
    fn inspect(&self, path: &Path) -> LocalSnapshot {
        let snapshot = inspect_repository(path);
        debug!(
            path = %path.display(),
            dirty = snapshot.has_uncommitted_changes,
            error = ?snapshot.error,
            "inspected local repository"
        );
        snapshot
    }
}

fn git(repo_dir: &Path, args: &[&str]) -> Result<Output, LocalRepositoryError> {
    Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| LocalRepositoryError::Git {
            detail: format!("failed to run git: {e}"),
        })
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Read one working copy: latest commit, branch, dirty flag and roadmap.
pub fn inspect_repository(path: &Path) -> LocalSnapshot {
    if !path.exists() {
        return LocalSnapshot::failed(LocalRepositoryError::PathMissing {
            path: path.to_path_buf(),
        });
    }

    let mut snapshot = LocalSnapshot {
        roadmap_path: find_roadmap(path),
        ..LocalSnapshot::default()
    };

    match is_work_tree(path) {
        Ok(true) => {}
        Ok(false) => {
            snapshot.error = Some(LocalRepositoryError::NotARepository {
                path: path.to_path_buf(),
            });
            return snapshot;
        }
        Err(e) => {
            snapshot.error = Some(e);
            return snapshot;
        }
    }

    snapshot.branch = current_branch(path).ok();

    match has_uncommitted_changes(path) {
        Ok(dirty) => snapshot.has_uncommitted_changes = dirty,
        Err(e) => {
            snapshot.error = Some(e);
            return snapshot;
        }
    }

    match latest_commit(path) {
        Ok(commit) => snapshot.latest_commit = Some(commit),
        Err(e) => snapshot.error = Some(e),
    }

    snapshot
}

fn is_work_tree(path: &Path) -> Result<bool, LocalRepositoryError> {
    let output = git(path, &["rev-parse", "--is-inside-work-tree"])?;
    Ok(output.status.success() && stdout_line(&output) == "true")
}

/// Current branch name, or `DETACHED` when HEAD points at a commit.
pub fn current_branch(repo_dir: &Path) -> Result<String, LocalRepositoryError> {
    let output = git(repo_dir, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;
    if output.status.success() {
        Ok(stdout_line(&output))
    } else {
        Ok("DETACHED".to_string())
    }
}

/// Staged, unstaged or untracked changes.
pub fn has_uncommitted_changes(repo_dir: &Path) -> Result<bool, LocalRepositoryError> {
    let output = git(repo_dir, &["status", "--porcelain", "--untracked-files=normal"])?;
    if !output.status.success() {
        return Err(LocalRepositoryError::Git {
            detail: format!(
                "git status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
}

/// Most recent commit reachable from HEAD.
pub fn latest_commit(repo_dir: &Path) -> Result<CommitInfo, LocalRepositoryError> {
    let head = git(repo_dir, &["rev-parse", "--verify", "--quiet", "HEAD"])?;
    if !head.status.success() {
        return Err(LocalRepositoryError::NoCommits);
    }

    let output = git(repo_dir, &["log", "-1", "--format=%H%x1f%an%x1f%ct%x1f%s"])?;
    if !output.status.success() {
        return Err(LocalRepositoryError::Git {
            detail: format!(
                "git log failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    parse_log_line(&stdout_line(&output))
}

fn parse_log_line(line: &str) -> Result<CommitInfo, LocalRepositoryError> {
    let malformed = || LocalRepositoryError::Git {
        detail: format!("unexpected git log output: {line:?}"),
    };
    let mut fields = line.splitn(4, FIELD_SEP);
    let sha = fields.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let author = fields.next().ok_or_else(malformed)?;
    let epoch: i64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)?;
    let message = fields.next().unwrap_or_default();
    let committed_at = Utc
        .timestamp_opt(epoch, 0)
        .single()
        .ok_or_else(malformed)?;

    Ok(CommitInfo {
        sha: sha.to_string(),
        author: author.to_string(),
        message: message.to_string(),
        committed_at,
    })
}

fn find_roadmap(path: &Path) -> Option<PathBuf> {
    ROADMAP_VARIANTS
        .iter()
        .map(|name| path.join(name))
        .find(|candidate| candidate.is_file())
}

/// Top-level directory of the working copy containing `dir`.
pub fn repository_root(dir: &Path) -> Result<PathBuf, String> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .output()
        .map_err(|e| format!("failed to run git: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "unreadable git metadata: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(PathBuf::from(stdout_line(&output)))
}

/// Read the URL configured for `remote`.
///
/// `Ok(None)` when the remote is not configured. `Err` when git itself fails,
/// e.g. because the repository metadata is corrupt.
pub fn read_remote_url(repo_dir: &Path, remote: &str) -> Result<Option<String>, String> {
    let key = format!("remote.{remote}.url");
    let output = Command::new("git")
        .args(["config", "--get", &key])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| format!("failed to run git: {e}"))?;

    if output.status.success() {
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        return Ok(Some(url).filter(|u| !u.is_empty()));
    }
    // `git config --get` exits 1 when the key is simply unset.
    if output.status.code() == Some(1) {
        return Ok(None);
    }
    Err(format!(
        "git config failed: {}",
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}
