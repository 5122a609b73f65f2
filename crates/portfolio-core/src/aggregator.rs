//! Drives local and remote lookups for a whole portfolio and scores the result.
//!
//! Local inspections run on the blocking pool, bounded by `local_workers`.
//! All remote identities go to the [`RemoteFetcher`] in one call; it streams
//! snapshots back batch by batch. Everything runs under one deadline: what
//! arrived before it is kept, the rest is recorded as a timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{warn, Instrument};

use crate::config::EngineConfig;
use crate::domain::{
    LocalRepositoryError, LocalSnapshot, PortfolioError, Project, ProjectRecord, RemoteError,
    RemoteIdentity, RemoteSnapshot, Result, RunReport,
};
use crate::git::{GitInspector, LocalInspector};
use crate::github::{dedup_identities, BatchedRemoteClient, RemoteFetcher};
use crate::obs;
use crate::scoring::{score_project, ScoringPolicy};

/// Runs one portfolio snapshot.
pub struct Aggregator {
    config: Arc<EngineConfig>,
    inspector: Arc<dyn LocalInspector>,
    remote: Arc<dyn RemoteFetcher>,
    policy: ScoringPolicy,
}

/// Lookups that had finished when collection stopped.
#[derive(Default)]
struct Collected {
    locals: HashMap<usize, LocalSnapshot>,
    remotes: HashMap<RemoteIdentity, RemoteSnapshot>,
}

impl Aggregator {
    pub fn new(
        config: Arc<EngineConfig>,
        inspector: Arc<dyn LocalInspector>,
        remote: Arc<dyn RemoteFetcher>,
    ) -> Self {
        let policy = ScoringPolicy::from_config(&config);
        Self {
            config,
            inspector,
            remote,
            policy,
        }
    }

    /// Production wiring: `git` for local copies, GraphQL over HTTPS for remotes.
    pub fn from_config(config: Arc<EngineConfig>) -> Result<Self> {
        config.validate()?;
        let remote = BatchedRemoteClient::from_config(Arc::clone(&config))?;
        Ok(Self::new(config, Arc::new(GitInspector), Arc::new(remote)))
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Produce one scored record per project, in input order.
    ///
    /// Only a fatal condition (invalid configuration, rejected credential)
    /// returns `Err`; every other failure ends up inside the affected record.
    pub async fn run(&self, projects: Vec<Project>) -> Result<RunReport> {
        self.config.validate()?;
        let run_id = obs::new_run_id();
        let span = obs::run_span(&run_id);
        self.run_with_id(run_id, projects).instrument(span).await
    }

    async fn run_with_id(&self, run_id: String, projects: Vec<Project>) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = clock + self.config.deadline;

        let identities = dedup_identities(
            projects
                .iter()
                .filter_map(|p| p.remote_identity.clone())
                .collect(),
        );
        obs::emit_run_started(&run_id, projects.len(), identities.len());

        let local_paths: Vec<(usize, PathBuf)> = projects
            .iter()
            .enumerate()
            .filter_map(|(index, p)| p.local_path.clone().map(|path| (index, path)))
            .collect();

        let (collected, timed_out) = self.collect(local_paths, identities, deadline).await?;
        if timed_out {
            warn!(
                deadline_ms = self.config.deadline.as_millis() as u64,
                "run deadline expired; unfinished lookups recorded as timeouts"
            );
        }

        let now = Utc::now();
        let records: Vec<ProjectRecord> = projects
            .into_iter()
            .enumerate()
            .map(|(index, project)| {
                let local = project.local_path.as_ref().map(|_| {
                    collected
                        .locals
                        .get(&index)
                        .cloned()
                        .unwrap_or_else(|| LocalSnapshot::failed(LocalRepositoryError::Timeout))
                });
                let remote = project.remote_identity.as_ref().map(|identity| {
                    collected
                        .remotes
                        .get(identity)
                        .cloned()
                        .unwrap_or_else(|| missing_remote(identity, timed_out))
                });
                let health = score_project(local.as_ref(), remote.as_ref(), &self.policy, now);
                obs::emit_project_scored(&project.name, health.score, health.status);
                ProjectRecord {
                    project,
                    local,
                    remote,
                    health,
                }
            })
            .collect();

        obs::emit_run_finished(
            &run_id,
            clock.elapsed().as_millis() as u64,
            records.len(),
            timed_out,
        );
        Ok(RunReport {
            run_id,
            records,
            started_at,
            finished_at: Utc::now(),
            timed_out,
        })
    }

    /// Run every lookup until all finish or `deadline` passes.
    ///
    /// Returns what was collected and whether the deadline cut it short.
    async fn collect(
        &self,
        local_paths: Vec<(usize, PathBuf)>,
        identities: Vec<RemoteIdentity>,
        deadline: Instant,
    ) -> Result<(Collected, bool)> {
        let mut collected = Collected::default();

        let workers = Arc::new(Semaphore::new(self.config.local_workers));
        let mut local_tasks = JoinSet::new();
        for (index, path) in local_paths {
            let inspector = Arc::clone(&self.inspector);
            let workers = Arc::clone(&workers);
            local_tasks.spawn(async move {
                let _permit = workers.acquire_owned().await.ok();
                let joined = tokio::task::spawn_blocking(move || inspector.inspect(&path)).await;
                let snapshot = joined.unwrap_or_else(|e| {
                    LocalSnapshot::failed(LocalRepositoryError::Git {
                        detail: format!("inspection task failed: {e}"),
                    })
                });
                (index, snapshot)
            });
        }

        let (sink, mut snapshots) = mpsc::unbounded_channel();
        let mut remote_task = JoinSet::new();
        if identities.is_empty() {
            drop(sink);
        } else {
            let remote = Arc::clone(&self.remote);
            remote_task.spawn(async move { remote.fetch(identities, sink).await });
        }

        let outcome = tokio::time::timeout_at(deadline, async {
            let mut channel_open = true;
            loop {
                tokio::select! {
                    Some(joined) = local_tasks.join_next() => {
                        let (index, snapshot) = joined?;
                        collected.locals.insert(index, snapshot);
                    }
                    received = snapshots.recv(), if channel_open => match received {
                        Some((identity, snapshot)) => {
                            collected.remotes.insert(identity, snapshot);
                        }
                        None => channel_open = false,
                    },
                    Some(joined) = remote_task.join_next() => {
                        joined??;
                    }
                    else => break,
                }
            }
            Ok::<(), PortfolioError>(())
        })
        .await;

        let timed_out = match outcome {
            Ok(result) => {
                result?;
                false
            }
            Err(_elapsed) => {
                local_tasks.abort_all();
                remote_task.abort_all();
                // Batches that completed right before the deadline are kept.
                while let Ok((identity, snapshot)) = snapshots.try_recv() {
                    collected.remotes.insert(identity, snapshot);
                }
                true
            }
        };
        Ok((collected, timed_out))
    }
}

fn missing_remote(identity: &RemoteIdentity, timed_out: bool) -> RemoteSnapshot {
    if timed_out {
        RemoteSnapshot::failed(RemoteError::Timeout)
    } else {
        RemoteSnapshot::failed(RemoteError::Access {
            detail: format!("no snapshot returned for {identity}"),
        })
    }
}
