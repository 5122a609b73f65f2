//! In-memory fakes for the engine's seams (testing only)
//!
//! Provides `ScriptedTransport`, `StaticInspector` and `StaticRemote`, which
//! satisfy the trait contracts without git, network or a real provider.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{
    LocalRepositoryError, LocalSnapshot, PortfolioError, RemoteIdentity, RemoteSnapshot, Result,
};
use crate::git::LocalInspector;
use crate::github::{
    GraphQlRequest, GraphQlTransport, HttpReply, RemoteFetcher, SnapshotSink, TransportError,
};

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// Replays queued replies in order and records every request it receives.
///
/// Once the script runs out, `fallback` (if any) answers every further call;
/// without one the transport reports a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<std::result::Result<HttpReply, TransportError>>>,
    fallback: Option<Box<dyn Fn(&GraphQlRequest) -> HttpReply + Send + Sync>>,
    calls: Mutex<Vec<(Instant, GraphQlRequest)>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.call_count())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call not covered by the script with `responder`.
    pub fn with_fallback(
        mut self,
        responder: impl Fn(&GraphQlRequest) -> HttpReply + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(responder));
        self
    }

    pub fn push(&self, reply: HttpReply) -> &Self {
        self.script.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn push_error(&self, error: impl Into<String>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError(error.into())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Instants (tokio clock) at which each call arrived.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl GraphQlTransport for ScriptedTransport {
    async fn post(&self, request: &GraphQlRequest) -> std::result::Result<HttpReply, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(responder) => Ok(responder(request)),
            None => Err(TransportError("script exhausted".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticInspector
// ---------------------------------------------------------------------------

/// Returns canned local snapshots by path. Unknown paths are missing.
#[derive(Debug, Default)]
pub struct StaticInspector {
    snapshots: HashMap<PathBuf, LocalSnapshot>,
    delay: Option<Duration>,
}

impl StaticInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, snapshot: LocalSnapshot) -> Self {
        self.snapshots.insert(path.into(), snapshot);
        self
    }

    /// Block the calling worker thread for `delay` on every inspection.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl LocalInspector for StaticInspector {
    fn inspect(&self, path: &Path) -> LocalSnapshot {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.snapshots.get(path).cloned().unwrap_or_else(|| {
            LocalSnapshot::failed(LocalRepositoryError::PathMissing {
                path: path.to_path_buf(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// StaticRemote
// ---------------------------------------------------------------------------

/// Serves canned remote snapshots, optionally stalling or failing fatally.
#[derive(Debug, Default)]
pub struct StaticRemote {
    snapshots: HashMap<RemoteIdentity, RemoteSnapshot>,
    /// Identities served before the remote stops answering.
    stall_after: Option<usize>,
    auth_failure: Option<String>,
    requested: Mutex<Vec<Vec<RemoteIdentity>>>,
}

impl StaticRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identity: RemoteIdentity, snapshot: RemoteSnapshot) -> Self {
        self.snapshots.insert(identity, snapshot);
        self
    }

    /// Send `served` snapshots, then never finish.
    pub fn stalling_after(mut self, served: usize) -> Self {
        self.stall_after = Some(served);
        self
    }

    pub fn rejecting_credentials(mut self, reason: impl Into<String>) -> Self {
        self.auth_failure = Some(reason.into());
        self
    }

    /// Identity lists passed to each `fetch` call.
    pub fn requested(&self) -> Vec<Vec<RemoteIdentity>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for StaticRemote {
    async fn fetch(&self, identities: Vec<RemoteIdentity>, sink: SnapshotSink) -> Result<()> {
        self.requested.lock().unwrap().push(identities.clone());
        if let Some(reason) = &self.auth_failure {
            return Err(PortfolioError::RemoteAuthentication(reason.clone()));
        }
        for (served, identity) in identities.into_iter().enumerate() {
            if self.stall_after == Some(served) {
                std::future::pending::<()>().await;
            }
            let Some(snapshot) = self.snapshots.get(&identity).cloned() else {
                continue;
            };
            if sink.send((identity, snapshot)).is_err() {
                break;
            }
        }
        Ok(())
    }
}
