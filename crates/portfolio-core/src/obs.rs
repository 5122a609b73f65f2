//! Structured observability hooks for portfolio run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key lifecycle events: start, batch, rate limit,
//!   retry, scoring, finish
//!
//! Events are emitted at `info!` level, except throttling and retries which
//! are `warn!`. Filter with `RUST_LOG`.

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::HealthStatus;

/// Span tagging every event of one run with its `run_id`.
///
/// Attach it to the run future with `tracing::Instrument` rather than
/// entering it, so the tag survives across await points.
///
/// # Example
///
/// ```ignore
/// aggregate(projects).instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("portfolio.run", run_id = %run_id)
}

/// Fresh identifier for one aggregation run.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Emit event: run started with the number of projects and remote identities.
pub fn emit_run_started(run_id: &str, projects: usize, identities: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        projects = projects,
        identities = identities,
    );
}

/// Emit event: one combined GraphQL request is about to be sent.
pub fn emit_batch_sent(kind: &str, batch: usize, repositories: usize) {
    info!(
        event = "remote.batch_sent",
        kind = %kind,
        batch = batch,
        repositories = repositories,
    );
}

/// Emit event: the provider throttled us; all requests pause for `wait`.
pub fn emit_rate_limited(wait: Duration, attempt: u32) {
    warn!(
        event = "remote.rate_limited",
        wait_ms = wait.as_millis() as u64,
        attempt = attempt,
    );
}

/// Emit event: a transient failure will be retried after `delay`.
pub fn emit_retry_scheduled(attempt: u32, delay: Duration, reason: &str) {
    warn!(
        event = "remote.retry_scheduled",
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        reason = %reason,
    );
}

/// Emit event: a project record was scored.
pub fn emit_project_scored(name: &str, score: u8, status: HealthStatus) {
    info!(
        event = "project.scored",
        project = %name,
        score = score,
        status = ?status,
    );
}

/// Emit event: run finished with duration, record count and whether the deadline hit.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, records: usize, timed_out: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        records = records,
        timed_out = timed_out,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(new_run_id(), new_run_id());
    }
}
