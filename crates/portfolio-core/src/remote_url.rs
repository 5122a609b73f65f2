//! Git remote URL -> `owner/repo` identity.
//!
//! Understands scp-like SSH remotes (`git@host:owner/repo.git`) and scheme
//! remotes (`https://host/owner/repo`, `ssh://git@host:22/owner/repo.git`, ...).
//! Anything else, including remotes on other hosts, yields `None`.

use url::Url;

use crate::domain::RemoteIdentity;

/// Default remote provider host.
pub const DEFAULT_REMOTE_HOST: &str = "github.com";

/// Parse `remote` into an identity if it points at `host`.
///
/// Never panics on malformed input. Host comparison ignores ASCII case; the
/// owner and repository name are returned exactly as written.
pub fn parse_remote_url(remote: &str, host: &str) -> Option<RemoteIdentity> {
    let remote = remote.trim();
    if remote.is_empty() || host.is_empty() {
        return None;
    }

    let path = if remote.contains("://") {
        let url = Url::parse(remote).ok()?;
        if !url.host_str()?.eq_ignore_ascii_case(host) {
            return None;
        }
        url.path().to_string()
    } else {
        let (authority, path) = remote.split_once(':')?;
        if authority.contains('/') {
            return None;
        }
        let remote_host = authority.rsplit('@').next()?;
        if !remote_host.eq_ignore_ascii_case(host) {
            return None;
        }
        path.to_string()
    };

    identity_from_path(&path)
}

fn identity_from_path(path: &str) -> Option<RemoteIdentity> {
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    RemoteIdentity::parse(path)
}
