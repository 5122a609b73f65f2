//! Aggregation over fake sources: merging, partial failure, shared
//! identities, deadlines and fatal errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use portfolio_core::fakes::{StaticInspector, StaticRemote};
use portfolio_core::{
    Aggregator, CommitInfo, EngineConfig, HealthStatus, LocalRepositoryError, LocalSnapshot,
    PortfolioError, Project, RemoteError, RemoteIdentity, RemoteSnapshot, Token,
};

fn config() -> EngineConfig {
    EngineConfig::new(Token::new("test-token"))
}

fn commit(days_ago: i64) -> CommitInfo {
    CommitInfo {
        sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
        author: "dev".to_string(),
        message: "work".to_string(),
        committed_at: Utc::now() - chrono::Duration::days(days_ago),
    }
}

fn local(dirty: bool) -> LocalSnapshot {
    LocalSnapshot {
        latest_commit: Some(commit(10)),
        branch: Some("main".to_string()),
        has_uncommitted_changes: dirty,
        roadmap_path: Some("ROADMAP.md".into()),
        error: None,
    }
}

fn remote(roadmap: bool) -> RemoteSnapshot {
    RemoteSnapshot {
        default_branch: Some("main".to_string()),
        latest_commit: Some(commit(10)),
        has_roadmap_file: roadmap,
        open_issue_count: 5,
        ..RemoteSnapshot::default()
    }
}

fn project(name: &str) -> Project {
    Project::new(name)
        .with_local_path(format!("/src/{name}"))
        .with_remote(RemoteIdentity::new("acme", name))
}

fn aggregator(
    config: EngineConfig,
    inspector: StaticInspector,
    fetcher: Arc<StaticRemote>,
) -> Aggregator {
    Aggregator::new(Arc::new(config), Arc::new(inspector), fetcher)
}

#[tokio::test]
async fn end_to_end_scores_follow_the_penalty_table() {
    let inspector = StaticInspector::new()
        .with("/src/clean", local(false))
        .with("/src/dirty", local(true))
        .with("/src/sloppy", local(true));
    let fetcher = Arc::new(
        StaticRemote::new()
            .with(RemoteIdentity::new("acme", "clean"), remote(true))
            .with(RemoteIdentity::new("acme", "dirty"), remote(true))
            .with(RemoteIdentity::new("acme", "sloppy"), remote(false)),
    );
    let report = aggregator(config(), inspector, fetcher)
        .run(vec![project("clean"), project("dirty"), project("sloppy")])
        .await
        .unwrap();

    let names: Vec<&str> = report.records.iter().map(|r| r.project.name.as_str()).collect();
    assert_eq!(names, vec!["clean", "dirty", "sloppy"]);

    let clean = report.record("clean").unwrap();
    assert_eq!(clean.health.score, 100);
    assert_eq!(clean.health.status, HealthStatus::Healthy);
    assert_eq!(clean.health.notes, vec!["All metrics healthy".to_string()]);

    let dirty = report.record("dirty").unwrap();
    assert_eq!(dirty.health.score, 85);
    assert_eq!(dirty.health.status, HealthStatus::Healthy);

    let sloppy = report.record("sloppy").unwrap();
    assert_eq!(sloppy.health.score, 65);
    assert_eq!(sloppy.health.status, HealthStatus::Warning);

    assert_eq!(report.healthy_count(), 2);
    assert_eq!(report.warning_count(), 1);
    assert!(!report.timed_out);
}

#[tokio::test]
async fn remote_failure_for_one_project_does_not_touch_another() {
    let inspector = StaticInspector::new()
        .with("/src/broken", local(false))
        .with("/src/fine", local(false));
    let fetcher = Arc::new(
        StaticRemote::new()
            .with(
                RemoteIdentity::new("acme", "broken"),
                RemoteSnapshot::failed(RemoteError::NotFound {
                    identity: "acme/broken".to_string(),
                }),
            )
            .with(RemoteIdentity::new("acme", "fine"), remote(true)),
    );
    let report = aggregator(config(), inspector, fetcher)
        .run(vec![project("broken"), project("fine")])
        .await
        .unwrap();

    let fine = report.record("fine").unwrap();
    assert_eq!(fine.health.score, 100);
    assert_eq!(fine.remote.as_ref().unwrap().open_issue_count, 5);

    let broken = report.record("broken").unwrap();
    assert!(broken.remote.as_ref().unwrap().error.is_some());
    // Scored from local facts alone; the failure is a note, not a penalty.
    assert_eq!(broken.health.score, 100);
    assert!(broken
        .health
        .notes
        .iter()
        .any(|n| n.contains("repository not found")));
}

#[tokio::test]
async fn local_failure_is_attached_to_its_record() {
    let fetcher =
        Arc::new(StaticRemote::new().with(RemoteIdentity::new("acme", "gone"), remote(true)));
    let report = aggregator(config(), StaticInspector::new(), fetcher)
        .run(vec![project("gone")])
        .await
        .unwrap();

    let record = &report.records[0];
    assert!(matches!(
        record.local.as_ref().unwrap().error,
        Some(LocalRepositoryError::PathMissing { .. })
    ));
    assert_eq!(record.health.score, 100);
    assert!(record.health.notes[0].starts_with("Local: path does not exist"));
}

#[tokio::test]
async fn shared_identity_is_fetched_once_and_attached_to_every_project() {
    let shared = RemoteIdentity::new("acme", "monorepo");
    let fetcher = Arc::new(StaticRemote::new().with(shared.clone(), remote(true)));
    let projects = vec![
        Project::new("api").with_remote(shared.clone()),
        Project::new("web").with_remote(shared.clone()),
    ];
    let report = aggregator(config(), StaticInspector::new(), fetcher.clone())
        .run(projects)
        .await
        .unwrap();

    assert_eq!(fetcher.requested(), vec![vec![shared]]);
    for record in &report.records {
        let snapshot = record.remote.as_ref().unwrap();
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.open_issue_count, 5);
        assert_eq!(record.health.score, 100);
    }
}

#[tokio::test]
async fn projects_without_remote_are_not_sent_to_the_client() {
    let fetcher = Arc::new(StaticRemote::new());
    let inspector = StaticInspector::new().with("/src/local-only", local(false));
    let report = aggregator(config(), inspector, fetcher.clone())
        .run(vec![Project::new("local-only").with_local_path("/src/local-only")])
        .await
        .unwrap();

    assert!(fetcher.requested().is_empty());
    let record = &report.records[0];
    assert!(record.remote.is_none());
    assert_eq!(record.health.score, 100);
}

#[tokio::test]
async fn rejected_credential_aborts_the_run() {
    let fetcher = Arc::new(StaticRemote::new().rejecting_credentials("Bad credentials"));
    let err = aggregator(config(), StaticInspector::new(), fetcher)
        .run(vec![project("any")])
        .await
        .unwrap_err();
    assert!(matches!(err, PortfolioError::RemoteAuthentication(_)));
}

#[tokio::test]
async fn deadline_keeps_received_snapshots_and_times_out_the_rest() {
    let inspector = StaticInspector::new()
        .with("/src/first", local(false))
        .with("/src/second", local(false));
    let fetcher = Arc::new(
        StaticRemote::new()
            .with(RemoteIdentity::new("acme", "first"), remote(true))
            .with(RemoteIdentity::new("acme", "second"), remote(true))
            .stalling_after(1),
    );
    let config = config().with_deadline(Duration::from_millis(300));
    let report = aggregator(config, inspector, fetcher)
        .run(vec![project("first"), project("second")])
        .await
        .unwrap();

    assert!(report.timed_out);
    assert_eq!(report.records.len(), 2);

    let first = report.record("first").unwrap();
    assert_eq!(first.remote.as_ref().unwrap().error, None);
    assert_eq!(first.health.score, 100);

    let second = report.record("second").unwrap();
    assert_eq!(
        second.remote.as_ref().unwrap().error,
        Some(RemoteError::Timeout)
    );
    assert_eq!(second.local.as_ref().unwrap().error, None);
}

#[tokio::test]
async fn slow_local_inspection_times_out() {
    let inspector = StaticInspector::new()
        .with("/src/slow", local(false))
        .with_delay(Duration::from_millis(600));
    let config = config().with_deadline(Duration::from_millis(100));
    let report = aggregator(config, inspector, Arc::new(StaticRemote::new()))
        .run(vec![Project::new("slow").with_local_path("/src/slow")])
        .await
        .unwrap();

    assert!(report.timed_out);
    let record = &report.records[0];
    assert_eq!(
        record.local.as_ref().unwrap().error,
        Some(LocalRepositoryError::Timeout)
    );
    assert_eq!(record.health.score, 0);
    assert_eq!(record.health.status, HealthStatus::Critical);
}
