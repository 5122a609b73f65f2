//! Error taxonomy for the portfolio engine.
//!
//! Only [`PortfolioError`] is fatal. Everything else is attached to a single
//! snapshot (and from there becomes a scorer note) or, for discovery, is
//! collected as a [`DiscoveryWarning`] next to the projects that were found.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fatal conditions that abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    /// Precondition failure detected before any I/O (e.g. missing credential).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The credential was rejected by the provider; no later call can succeed.
    #[error("remote authentication failed: {0}")]
    RemoteAuthentication(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for fatal engine operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Why a local working copy could not be (fully) read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalRepositoryError {
    #[error("path does not exist: {}", path.display())]
    PathMissing { path: PathBuf },

    #[error("not a git repository: {}", path.display())]
    NotARepository { path: PathBuf },

    #[error("repository has no commits")]
    NoCommits,

    #[error("git command failed: {detail}")]
    Git { detail: String },

    #[error("local lookup abandoned at run deadline")]
    Timeout,
}

/// Why a remote repository could not be (fully) read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    #[error("repository not found: {identity}")]
    NotFound { identity: String },

    #[error("access denied to {identity}: {detail}")]
    AccessDenied { identity: String, detail: String },

    /// Transient failures exhausted their retries, or the provider rejected
    /// the request in a way retrying cannot fix.
    #[error("remote lookup failed: {detail}")]
    Access { detail: String },

    #[error("rate limit persisted after {waits} waits")]
    RateLimited { waits: u32 },

    #[error("remote lookup abandoned at run deadline")]
    Timeout,
}

/// A directory entry skipped during discovery. Never aborts the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.path.display(), self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = PortfolioError::Configuration("GITHUB_TOKEN is not set".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_local_error_displays_path() {
        let err = LocalRepositoryError::PathMissing {
            path: PathBuf::from("/tmp/gone"),
        };
        assert!(err.to_string().contains("/tmp/gone"));
    }

    #[test]
    fn test_remote_error_serializes_with_kind_tag() {
        let err = RemoteError::NotFound {
            identity: "acme/widgets".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["identity"], "acme/widgets");
    }

    #[test]
    fn test_discovery_warning_display() {
        let warning = DiscoveryWarning {
            path: PathBuf::from("/src/broken"),
            reason: "corrupt metadata".to_string(),
        };
        let msg = warning.to_string();
        assert!(msg.contains("/src/broken"));
        assert!(msg.contains("corrupt metadata"));
    }
}
