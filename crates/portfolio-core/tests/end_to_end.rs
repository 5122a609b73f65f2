//! Discovery, git inspection and the batched client wired together over real
//! temporary repositories and a scripted GraphQL endpoint.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use portfolio_core::fakes::ScriptedTransport;
use portfolio_core::github::{GraphQlRequest, HttpReply};
use portfolio_core::{
    discover, Aggregator, BatchedRemoteClient, DiscoveryRequest, EngineConfig, GitInspector,
    HealthStatus, RemoteIdentity, Token,
};
use serde_json::{json, Map};

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn make_git_repo(root: &Path, name: &str, origin: Option<&str>) {
    let dir = root.join(name);
    std::fs::create_dir(&dir).unwrap();
    run_git(&dir, &["init"]);
    run_git(&dir, &["config", "user.name", "test-user"]);
    run_git(&dir, &["config", "user.email", "test@example.com"]);
    std::fs::write(dir.join("ROADMAP.md"), "# Next\n").unwrap();
    run_git(&dir, &["add", "ROADMAP.md"]);
    run_git(&dir, &["commit", "-m", "initial"]);
    if let Some(url) = origin {
        run_git(&dir, &["remote", "add", "origin", url]);
    }
}

/// Every aliased repository exists, has a roadmap and a few issues. The one
/// named `noisy` has 60 open issues.
fn provider(request: &GraphQlRequest) -> HttpReply {
    let mut data = Map::new();
    for index in 0..request.alias_count() {
        let name = request.variables[&format!("n{index}")].as_str().unwrap_or_default();
        let issues = if name == "noisy" { 60 } else { 3 };
        data.insert(
            format!("r{index}"),
            json!({
                "defaultBranchRef": {
                    "name": "main",
                    "target": {
                        "latest": { "nodes": [{
                            "oid": "feedfacefeedfacefeedfacefeedfacefeedface",
                            "messageHeadline": "Remote work",
                            "committedDate": Utc::now().to_rfc3339(),
                            "author": { "name": "someone" }
                        }]},
                        "recent": { "totalCount": 1 }
                    }
                },
                "roadmap": { "__typename": "Blob" },
                "issues": {
                    "totalCount": issues,
                    "pageInfo": { "hasNextPage": false },
                    "nodes": []
                },
                "milestones": { "nodes": [] },
                "pullRequests": { "totalCount": 0 }
            }),
        );
    }
    HttpReply::ok(json!({ "data": data }).to_string())
}

#[tokio::test]
async fn discovered_portfolio_is_inspected_fetched_and_scored() {
    let root = tempfile::tempdir().unwrap();
    make_git_repo(root.path(), "alpha", Some("git@github.com:acme/alpha.git"));
    make_git_repo(root.path(), "noisy", Some("https://github.com/acme/noisy"));
    make_git_repo(root.path(), "offline", None);
    std::fs::write(root.path().join("noisy").join("scratch.txt"), "wip").unwrap();

    let outcome = discover(&DiscoveryRequest::new(root.path())).unwrap();
    assert_eq!(outcome.len(), 3);
    assert!(outcome.warnings.is_empty());

    let config = Arc::new(EngineConfig::new(Token::new("test-token")));
    let transport = Arc::new(ScriptedTransport::new().with_fallback(provider));
    let client = BatchedRemoteClient::new(transport.clone(), Arc::clone(&config));
    let aggregator = Aggregator::new(config, Arc::new(GitInspector), Arc::new(client));

    let report = aggregator.run(outcome.projects).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.requests()[0].alias_count(), 2);
    assert_eq!(report.records.len(), 3);

    let alpha = report.record("alpha").unwrap();
    assert_eq!(
        alpha.project.remote_identity,
        Some(RemoteIdentity::new("acme", "alpha"))
    );
    assert_eq!(alpha.health.score, 100);
    assert_eq!(
        alpha.local.as_ref().unwrap().latest_commit.as_ref().unwrap().message,
        "initial"
    );

    // 60 open issues (-20) and an untracked file (-15).
    let noisy = report.record("noisy").unwrap();
    assert_eq!(noisy.health.score, 65);
    assert_eq!(noisy.health.status, HealthStatus::Warning);
    assert!(noisy.local.as_ref().unwrap().has_uncommitted_changes);

    let offline = report.record("offline").unwrap();
    assert!(offline.remote.is_none());
    assert_eq!(offline.health.score, 100);
}
