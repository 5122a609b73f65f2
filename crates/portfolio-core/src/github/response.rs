//! Decoding of GraphQL responses into snapshot pieces.
//!
//! Every provider field is optional here: a missing connection is an empty
//! sequence, not an error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::query::Connection;
use crate::domain::{
    CommitInfo, IssuePriority, Milestone, RemoteError, RemoteIdentity, RemoteSnapshot,
};

/// Top-level GraphQL response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub path: Vec<Value>,
}

impl GraphQlError {
    /// First path segment, i.e. the alias the error belongs to.
    pub fn alias(&self) -> Option<&str> {
        self.path.first().and_then(Value::as_str)
    }
}

impl GraphQlResponse {
    pub fn rate_limit(&self) -> Option<RateLimitNode> {
        let value = self.data.as_ref()?.get("rateLimit")?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
    }

    fn aliased(&self, alias: &str) -> Option<&Value> {
        self.data
            .as_ref()?
            .get(alias)
            .filter(|value| !value.is_null())
    }

    fn error_for(&self, alias: &str) -> Option<&GraphQlError> {
        self.errors.iter().find(|e| e.alias() == Some(alias))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitNode {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub cost: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CountOnly {
    #[serde(default, rename = "totalCount")]
    total_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

impl PageInfo {
    fn next_cursor(self) -> Option<String> {
        if self.has_next_page {
            self.end_cursor
        } else {
            None
        }
    }

    /// More data exists but the provider gave no cursor to reach it.
    fn is_dead_end(&self) -> bool {
        self.has_next_page && self.end_cursor.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
struct NameNode {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LabelConnection {
    #[serde(default)]
    nodes: Vec<Option<NameNode>>,
}

#[derive(Debug, Default, Deserialize)]
struct IssueNode {
    #[serde(default)]
    labels: Option<LabelConnection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    #[serde(default)]
    total_count: u32,
    #[serde(default)]
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<IssueNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MilestoneNode {
    title: String,
    #[serde(default)]
    due_on: Option<DateTime<Utc>>,
    #[serde(default)]
    progress_percentage: Option<f64>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    open_issues: CountOnly,
    #[serde(default)]
    closed_issues: CountOnly,
}

impl From<MilestoneNode> for Milestone {
    fn from(node: MilestoneNode) -> Self {
        let open = node.open_issues.total_count;
        let closed = node.closed_issues.total_count;
        Milestone {
            title: node.title,
            percent_complete: node.progress_percentage.unwrap_or(0.0),
            closed_count: closed,
            total_count: open + closed,
            due_on: node.due_on,
            updated_at: node.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MilestoneConnection {
    #[serde(default)]
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<MilestoneNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitNode {
    oid: String,
    #[serde(default)]
    message_headline: String,
    committed_date: DateTime<Utc>,
    #[serde(default)]
    author: Option<NameNode>,
}

impl From<CommitNode> for CommitInfo {
    fn from(node: CommitNode) -> Self {
        CommitInfo {
            sha: node.oid,
            author: node.author.and_then(|a| a.name).unwrap_or_default(),
            message: node.message_headline,
            committed_at: node.committed_date,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CommitHistory {
    #[serde(default)]
    nodes: Vec<Option<CommitNode>>,
}

#[derive(Debug, Default, Deserialize)]
struct CommitTarget {
    #[serde(default)]
    latest: Option<CommitHistory>,
    #[serde(default)]
    recent: Option<CountOnly>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    name: String,
    #[serde(default)]
    target: Option<CommitTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    #[serde(default)]
    default_branch_ref: Option<BranchRef>,
    #[serde(default)]
    roadmap: Option<Value>,
    #[serde(default)]
    issues: Option<IssueConnection>,
    #[serde(default)]
    milestones: Option<MilestoneConnection>,
    #[serde(default)]
    pull_requests: Option<CountOnly>,
}

#[derive(Debug, Default, Deserialize)]
struct PageNode {
    #[serde(default)]
    issues: Option<IssueConnection>,
    #[serde(default)]
    milestones: Option<MilestoneConnection>,
}

/// A remote snapshot still being assembled across paginated requests.
#[derive(Debug, Clone, Default)]
pub struct PartialRepo {
    pub snapshot: RemoteSnapshot,
    pub issues_cursor: Option<String>,
    pub milestones_cursor: Option<String>,
}

impl PartialRepo {
    pub fn failed(error: RemoteError) -> Self {
        Self {
            snapshot: RemoteSnapshot::failed(error),
            ..Self::default()
        }
    }

    pub fn has_pending_pages(&self) -> bool {
        self.issues_cursor.is_some() || self.milestones_cursor.is_some()
    }

    /// Give up on remaining pages; what was fetched is kept but flagged.
    pub fn abandon_pages(&mut self) {
        if self.has_pending_pages() {
            self.snapshot.truncated = true;
        }
        self.issues_cursor = None;
        self.milestones_cursor = None;
    }

    /// Give up on one connection only; the other keeps its cursor.
    pub fn abandon(&mut self, connection: Connection) {
        let cursor = match connection {
            Connection::Issues => &mut self.issues_cursor,
            Connection::Milestones => &mut self.milestones_cursor,
        };
        if cursor.take().is_some() {
            self.snapshot.truncated = true;
        }
    }

    pub fn finish(mut self) -> RemoteSnapshot {
        self.abandon_pages();
        self.snapshot
    }

    fn absorb_issues(&mut self, connection: IssueConnection) {
        for issue in connection.nodes.into_iter().flatten() {
            let labels = issue.labels.unwrap_or_default().nodes;
            let names = labels.iter().flatten().filter_map(|l| l.name.as_deref());
            self.snapshot
                .issues_by_priority
                .record(IssuePriority::from_labels(names));
        }
        if connection.page_info.is_dead_end() {
            self.snapshot.truncated = true;
        }
        self.issues_cursor = connection.page_info.next_cursor();
    }

    fn absorb_milestones(&mut self, connection: MilestoneConnection) {
        self.snapshot
            .milestones
            .extend(connection.nodes.into_iter().flatten().map(Milestone::from));
        if connection.page_info.is_dead_end() {
            self.snapshot.truncated = true;
        }
        self.milestones_cursor = connection.page_info.next_cursor();
    }

    /// Merge the follow-up page of `connection` returned under `alias`.
    pub fn absorb_page(
        &mut self,
        response: &GraphQlResponse,
        alias: &str,
        identity: &RemoteIdentity,
        connection: Connection,
    ) {
        let page = response
            .aliased(alias)
            .and_then(|value| serde_json::from_value::<PageNode>(value.clone()).ok())
            .unwrap_or_default();
        match (connection, page.issues, page.milestones) {
            (Connection::Issues, Some(issues), _) => self.absorb_issues(issues),
            (Connection::Milestones, _, Some(milestones)) => self.absorb_milestones(milestones),
            _ => {
                warn!(repo = %identity, alias, ?connection, "follow-up page missing from response");
                self.abandon(connection);
            }
        }
    }
}

/// Snapshot for the repository returned under `alias`, or the error that
/// explains why it is missing.
pub fn repository_from(
    response: &GraphQlResponse,
    alias: &str,
    identity: &RemoteIdentity,
) -> PartialRepo {
    let Some(value) = response.aliased(alias) else {
        return PartialRepo::failed(alias_error(response.error_for(alias), identity));
    };
    if let Some(error) = response.error_for(alias) {
        warn!(repo = %identity, error = %error.message, "partial data for repository");
    }

    let node: RepositoryNode = match serde_json::from_value(value.clone()) {
        Ok(node) => node,
        Err(e) => {
            return PartialRepo::failed(RemoteError::Access {
                detail: format!("unexpected response shape for {identity}: {e}"),
            })
        }
    };

    let mut partial = PartialRepo::default();
    let snapshot = &mut partial.snapshot;
    snapshot.has_roadmap_file = node.roadmap.is_some_and(|v| !v.is_null());
    snapshot.open_pull_requests = node.pull_requests.map_or(0, |c| c.total_count);

    if let Some(branch) = node.default_branch_ref {
        snapshot.default_branch = Some(branch.name);
        if let Some(target) = branch.target {
            snapshot.recent_commit_count = target.recent.map_or(0, |c| c.total_count);
            snapshot.latest_commit = target
                .latest
                .and_then(|h| h.nodes.into_iter().flatten().next())
                .map(CommitInfo::from);
        }
    }

    if let Some(issues) = node.issues {
        partial.snapshot.open_issue_count = issues.total_count;
        partial.absorb_issues(issues);
    }
    if let Some(milestones) = node.milestones {
        partial.absorb_milestones(milestones);
    }
    partial
}

fn alias_error(error: Option<&GraphQlError>, identity: &RemoteIdentity) -> RemoteError {
    let identity = identity.to_string();
    match error {
        None => RemoteError::NotFound { identity },
        Some(e) => match e.kind.as_deref() {
            Some("NOT_FOUND") => RemoteError::NotFound { identity },
            Some("FORBIDDEN") => RemoteError::AccessDenied {
                identity,
                detail: e.message.clone(),
            },
            _ => RemoteError::Access {
                detail: format!("{identity}: {}", e.message),
            },
        },
    }
}
