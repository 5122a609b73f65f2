//! Discovery of local repositories under a root directory.
//!
//! Each immediate subdirectory holding git metadata becomes a [`Project`]
//! with unknown pillar and priority. A bad entry is skipped with a
//! [`DiscoveryWarning`]; only an unreadable root aborts the scan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{DiscoveryWarning, Project, Result};
use crate::git::{read_remote_url, repository_root};
use crate::remote_url::{parse_remote_url, DEFAULT_REMOTE_HOST};

/// Where and how to look for repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub root: PathBuf,
    /// Directory names to skip.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    /// Also consider entries whose name starts with `.`.
    #[serde(default)]
    pub include_hidden: bool,
    /// Remote provider host used to derive `owner/repo` identities.
    #[serde(default = "default_remote_host")]
    pub remote_host: String,
}

fn default_remote_host() -> String {
    DEFAULT_REMOTE_HOST.to_string()
}

impl DiscoveryRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: BTreeSet::new(),
            include_hidden: false,
            remote_host: default_remote_host(),
        }
    }

    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = host.into();
        self
    }
}

/// Projects found by a scan plus the entries that had to be skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub projects: Vec<Project>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryOutcome {
    /// Zero repositories found; the caller may fall back to static config.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }
}

/// Scan the immediate subdirectories of `request.root`.
///
/// Results are sorted by directory name; callers should still not rely on
/// any particular order.
pub fn discover(request: &DiscoveryRequest) -> Result<DiscoveryOutcome> {
    let mut outcome = DiscoveryOutcome::default();

    for entry in std::fs::read_dir(&request.root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                skip(&mut outcome, request.root.clone(), format!("unreadable entry: {e}"));
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') && !request.include_hidden {
            continue;
        }
        if request.exclude.contains(&name) {
            debug!(name = %name, "excluded from discovery");
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => {}
            Ok(_) => continue,
            Err(e) => {
                skip(&mut outcome, path, format!("cannot stat entry: {e}"));
                continue;
            }
        }
        if !has_git_metadata(&path) {
            continue;
        }

        if let Err(reason) = check_repository_root(&path) {
            skip(&mut outcome, path, reason);
            continue;
        }

        match read_remote_url(&path, "origin") {
            Ok(remote) => {
                let identity = remote
                    .as_deref()
                    .and_then(|url| parse_remote_url(url, &request.remote_host));
                let mut project = Project::new(name).with_local_path(path);
                project.remote_identity = identity;
                outcome.projects.push(project);
            }
            Err(reason) => skip(&mut outcome, path, reason),
        }
    }

    outcome.projects.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        root = %request.root.display(),
        found = outcome.projects.len(),
        skipped = outcome.warnings.len(),
        "discovery finished"
    );
    Ok(outcome)
}

fn has_git_metadata(path: &Path) -> bool {
    // `.git` is a file for worktrees and submodules.
    path.join(".git").exists()
}

/// The entry must be the root of its own working copy, not a directory that
/// git resolves to some enclosing repository.
fn check_repository_root(path: &Path) -> std::result::Result<(), String> {
    let root = repository_root(path)?;
    let same = match (root.canonicalize(), path.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => root == path,
    };
    if same {
        Ok(())
    } else {
        Err(format!(
            "git metadata resolves to enclosing repository {}",
            root.display()
        ))
    }
}

fn skip(outcome: &mut DiscoveryOutcome, path: PathBuf, reason: String) {
    let warning = DiscoveryWarning { path, reason };
    warn!(warning = %warning, "discovery entry skipped");
    outcome.warnings.push(warning);
}
