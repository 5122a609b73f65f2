//! Batched remote client.
//!
//! Identities are split into batches of `batch_size` aliases; each batch is
//! one GraphQL request. Follow-up pages for long issue or milestone lists are
//! batched across repositories the same way. Batches run one after another
//! so the shared rate budget is observed by every request.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::query::{self, Connection, GraphQlRequest, OverviewOptions, PageRequest};
use super::rate_limit::{until_reset, Backoff, RateBudget};
use super::response::{repository_from, GraphQlResponse, PartialRepo};
use super::transport::{classify, CallOutcome, GraphQlTransport, ReqwestTransport};
use crate::config::EngineConfig;
use crate::domain::{PortfolioError, RemoteError, RemoteIdentity, RemoteSnapshot, Result};
use crate::obs;

/// Receives each remote snapshot as soon as its batch completes.
pub type SnapshotSink = mpsc::UnboundedSender<(RemoteIdentity, RemoteSnapshot)>;

/// Source of remote snapshots for a set of identities.
///
/// Implementations send exactly one snapshot per distinct identity into
/// `sink`, unless the receiver goes away or a fatal error is returned.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, identities: Vec<RemoteIdentity>, sink: SnapshotSink) -> Result<()>;
}

/// [`RemoteFetcher`] that combines many repository lookups per request.
pub struct BatchedRemoteClient {
    transport: Arc<dyn GraphQlTransport>,
    config: Arc<EngineConfig>,
    budget: RateBudget,
    round_trips: AtomicUsize,
}

impl BatchedRemoteClient {
    /// `config` is validated when a fetch starts, not here.
    pub fn new(transport: Arc<dyn GraphQlTransport>, config: Arc<EngineConfig>) -> Self {
        Self {
            transport,
            config,
            budget: RateBudget::new(),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Client talking to `config.api_url` over HTTPS.
    pub fn from_config(config: Arc<EngineConfig>) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Requests sent so far, retries included.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Fetch everything and collect it into a map keyed by identity.
    pub async fn fetch_all(
        &self,
        identities: Vec<RemoteIdentity>,
    ) -> Result<HashMap<RemoteIdentity, RemoteSnapshot>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.fetch(identities, tx).await?;
        let mut snapshots = HashMap::new();
        while let Some((identity, snapshot)) = rx.recv().await {
            snapshots.insert(identity, snapshot);
        }
        Ok(snapshots)
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            base: self.config.backoff_base,
            max: self.config.backoff_max,
        }
    }

    fn overview_options(&self) -> OverviewOptions {
        OverviewOptions {
            since: lookback_start(Utc::now(), self.config.lookback_days),
            page_size: self.config.page_size,
            roadmap_expression: format!("HEAD:{}", self.config.roadmap_path),
        }
    }

    /// Send one request until it succeeds or its retry budget runs out.
    ///
    /// The outer `Err` is fatal for the run. The inner `Err` applies to every
    /// repository in the request.
    async fn execute(
        &self,
        request: &GraphQlRequest,
    ) -> Result<std::result::Result<GraphQlResponse, RemoteError>> {
        let backoff = self.backoff();
        let mut retries = 0u32;
        let mut waits = 0u32;

        loop {
            self.budget.wait_turn().await;
            self.round_trips.fetch_add(1, Ordering::Relaxed);
            let reply = self.transport.post(request).await;

            match classify(reply, Utc::now()) {
                CallOutcome::Success(response) => {
                    if let Some(rate) = response.rate_limit() {
                        debug!(remaining = rate.remaining, cost = ?rate.cost, "rate budget");
                        if let Some(wait) = self.budget.observe(&rate, Utc::now()).await {
                            obs::emit_rate_limited(wait, 0);
                        }
                    }
                    return Ok(Ok(response));
                }
                CallOutcome::RateLimited { reset_at } => {
                    if waits >= self.config.max_rate_limit_waits {
                        return Ok(Err(RemoteError::RateLimited { waits }));
                    }
                    let wait = match reset_at {
                        Some(reset_at) => until_reset(reset_at, Utc::now()),
                        None => backoff.delay(waits),
                    };
                    waits += 1;
                    obs::emit_rate_limited(wait, waits);
                    self.budget.pause_for(wait).await;
                }
                CallOutcome::Retryable(reason) => {
                    if retries >= self.config.max_retries {
                        return Ok(Err(RemoteError::Access {
                            detail: format!("gave up after {retries} retries: {reason}"),
                        }));
                    }
                    let delay = backoff.delay(retries);
                    retries += 1;
                    obs::emit_retry_scheduled(retries, delay, &reason);
                    tokio::time::sleep(delay).await;
                }
                CallOutcome::Rejected(reason) => {
                    return Ok(Err(RemoteError::Access { detail: reason }));
                }
                CallOutcome::Fatal(reason) => {
                    return Err(PortfolioError::RemoteAuthentication(reason));
                }
            }
        }
    }

    async fn fetch_batch(
        &self,
        batch: usize,
        chunk: &[RemoteIdentity],
        options: &OverviewOptions,
    ) -> Result<Vec<RemoteSnapshot>> {
        let request = query::overview(chunk, options);
        obs::emit_batch_sent("overview", batch, chunk.len());

        let response = match self.execute(&request).await? {
            Ok(response) => response,
            Err(error) => {
                warn!(batch, error = %error, "batch failed");
                return Ok(chunk
                    .iter()
                    .map(|_| RemoteSnapshot::failed(error.clone()))
                    .collect());
            }
        };

        let mut partials: Vec<PartialRepo> = chunk
            .iter()
            .enumerate()
            .map(|(index, identity)| {
                repository_from(&response, &query::overview_alias(index), identity)
            })
            .collect();

        self.paginate(batch, chunk, &mut partials).await?;
        Ok(partials.into_iter().map(PartialRepo::finish).collect())
    }

    /// Follow cursors until every connection is exhausted or `max_pages` is
    /// reached. Whatever is still pending afterwards is flagged as truncated.
    async fn paginate(
        &self,
        batch: usize,
        chunk: &[RemoteIdentity],
        partials: &mut [PartialRepo],
    ) -> Result<()> {
        for _ in 1..self.config.max_pages {
            let pending = pending_pages(chunk, partials);
            if pending.is_empty() {
                return Ok(());
            }

            for round in pending.chunks(self.config.batch_size) {
                let request = query::pages(round, self.config.page_size);
                obs::emit_batch_sent("pages", batch, round.len());

                match self.execute(&request).await? {
                    Ok(response) => {
                        for (position, page) in round.iter().enumerate() {
                            partials[page.index].absorb_page(
                                &response,
                                &query::page_alias(position),
                                &page.identity,
                                page.connection,
                            );
                        }
                    }
                    Err(error) => {
                        warn!(batch, error = %error, "follow-up pages failed; keeping what was fetched");
                        for page in round {
                            partials[page.index].abandon(page.connection);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Start of the recent-activity window, clamped to the earliest representable
/// instant.
fn lookback_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    chrono::Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn pending_pages(chunk: &[RemoteIdentity], partials: &[PartialRepo]) -> Vec<PageRequest> {
    let mut pending = Vec::new();
    for (index, (identity, partial)) in chunk.iter().zip(partials).enumerate() {
        let cursors = [
            (Connection::Issues, &partial.issues_cursor),
            (Connection::Milestones, &partial.milestones_cursor),
        ];
        for (connection, cursor) in cursors {
            if let Some(after) = cursor {
                pending.push(PageRequest {
                    index,
                    identity: identity.clone(),
                    connection,
                    after: after.clone(),
                });
            }
        }
    }
    pending
}

/// Drop repeated identities, keeping first-seen order.
pub fn dedup_identities(identities: Vec<RemoteIdentity>) -> Vec<RemoteIdentity> {
    let mut seen = HashSet::new();
    identities
        .into_iter()
        .filter(|identity| seen.insert(identity.clone()))
        .collect()
}

#[async_trait]
impl RemoteFetcher for BatchedRemoteClient {
    async fn fetch(&self, identities: Vec<RemoteIdentity>, sink: SnapshotSink) -> Result<()> {
        self.config.validate()?;
        let identities = dedup_identities(identities);
        let options = self.overview_options();

        for (batch, chunk) in identities.chunks(self.config.batch_size).enumerate() {
            let snapshots = self.fetch_batch(batch, chunk, &options).await?;
            for (identity, snapshot) in chunk.iter().cloned().zip(snapshots) {
                if sink.send((identity, snapshot)).is_err() {
                    debug!("snapshot receiver dropped; stopping remote fetch");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookback_start_never_overflows() {
        let now = Utc::now();
        assert_eq!(lookback_start(now, 0), now);
        assert_eq!(lookback_start(now, 1), now - chrono::Duration::days(1));
        assert_eq!(lookback_start(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let a = RemoteIdentity::new("acme", "a");
        let b = RemoteIdentity::new("acme", "b");
        let deduped = dedup_identities(vec![b.clone(), a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![b, a]);
    }

    #[test]
    fn test_pending_pages_lists_each_open_cursor() {
        let chunk = vec![
            RemoteIdentity::new("acme", "a"),
            RemoteIdentity::new("acme", "b"),
        ];
        let mut first = PartialRepo::default();
        first.issues_cursor = Some("i1".to_string());
        first.milestones_cursor = Some("m1".to_string());
        let partials = vec![first, PartialRepo::default()];

        let pending = pending_pages(&chunk, &partials);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|p| p.index == 0));
        assert_eq!(pending[0].connection, Connection::Issues);
        assert_eq!(pending[1].after, "m1");
    }
}
