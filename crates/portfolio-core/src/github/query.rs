//! GraphQL documents for batched repository lookups.
//!
//! Each repository in a batch becomes one aliased `repository(...)` field, so
//! N repositories cost one request instead of N. Owner and name are always
//! passed as variables, never spliced into the document text.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::domain::RemoteIdentity;

/// Body of a GraphQL POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Map<String, Value>,
}

impl GraphQlRequest {
    /// Number of aliased repository fields in the document.
    pub fn alias_count(&self) -> usize {
        self.query.matches(": repository(").count()
    }
}

/// Knobs shared by every overview batch of a run.
#[derive(Debug, Clone)]
pub struct OverviewOptions {
    pub since: DateTime<Utc>,
    pub page_size: u32,
    /// Object expression for the roadmap blob, e.g. `HEAD:ROADMAP.md`.
    pub roadmap_expression: String,
}

/// A paginated connection of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Issues,
    Milestones,
}

/// One follow-up page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Position of the repository within its batch.
    pub index: usize,
    pub identity: RemoteIdentity,
    pub connection: Connection,
    pub after: String,
}

const RATE_LIMIT_SELECTION: &str = "  rateLimit { limit cost remaining resetAt }\n";

const ISSUE_PAGE_FRAGMENT: &str = "fragment IssuePage on IssueConnection {
  totalCount
  pageInfo { hasNextPage endCursor }
  nodes { labels(first: 10) { nodes { name } } }
}
";

const MILESTONE_PAGE_FRAGMENT: &str = "fragment MilestonePage on MilestoneConnection {
  pageInfo { hasNextPage endCursor }
  nodes {
    title
    dueOn
    progressPercentage
    updatedAt
    openIssues: issues(states: OPEN) { totalCount }
    closedIssues: issues(states: CLOSED) { totalCount }
  }
}
";

const OVERVIEW_FRAGMENT: &str = "fragment RepoOverview on Repository {
  defaultBranchRef {
    name
    target {
      ... on Commit {
        latest: history(first: 1) {
          nodes { oid messageHeadline committedDate author { name } }
        }
        recent: history(since: $since) { totalCount }
      }
    }
  }
  roadmap: object(expression: $roadmap) { __typename }
  issues(states: OPEN, first: $pageSize) { ...IssuePage }
  milestones(states: OPEN, first: $pageSize) { ...MilestonePage }
  pullRequests(states: OPEN) { totalCount }
}
";

fn push_repository_variables(
    variables: &mut Map<String, Value>,
    definitions: &mut String,
    index: usize,
    identity: &RemoteIdentity,
) {
    let _ = write!(definitions, ", $o{index}: String!, $n{index}: String!");
    variables.insert(format!("o{index}"), json!(identity.owner));
    variables.insert(format!("n{index}"), json!(identity.name));
}

/// Alias used for the `index`-th repository of an overview batch.
pub fn overview_alias(index: usize) -> String {
    format!("r{index}")
}

/// Alias used for the `index`-th follow-up page of a pagination batch.
pub fn page_alias(index: usize) -> String {
    format!("p{index}")
}

/// First-page overview for every repository in `targets`.
pub fn overview(targets: &[RemoteIdentity], options: &OverviewOptions) -> GraphQlRequest {
    let mut variables = Map::new();
    variables.insert(
        "since".to_string(),
        json!(options.since.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    variables.insert("pageSize".to_string(), json!(options.page_size));
    variables.insert("roadmap".to_string(), json!(options.roadmap_expression));

    let mut definitions = String::from("$since: GitTimestamp!, $pageSize: Int!, $roadmap: String!");
    let mut selections = String::new();
    for (index, identity) in targets.iter().enumerate() {
        push_repository_variables(&mut variables, &mut definitions, index, identity);
        let _ = writeln!(
            selections,
            "  {}: repository(owner: $o{index}, name: $n{index}) {{ ...RepoOverview }}",
            overview_alias(index)
        );
    }

    let query = format!(
        "query PortfolioOverview({definitions}) {{\n{selections}{RATE_LIMIT_SELECTION}}}\n\
         {OVERVIEW_FRAGMENT}{ISSUE_PAGE_FRAGMENT}{MILESTONE_PAGE_FRAGMENT}"
    );
    GraphQlRequest { query, variables }
}

/// Follow-up pages for connections that did not fit in the first page.
///
/// Only the fragments and variables actually referenced are emitted, since
/// GraphQL rejects unused ones.
pub fn pages(requests: &[PageRequest], page_size: u32) -> GraphQlRequest {
    let mut variables = Map::new();
    variables.insert("pageSize".to_string(), json!(page_size));

    let mut definitions = String::from("$pageSize: Int!");
    let mut selections = String::new();
    let mut wants_issues = false;
    let mut wants_milestones = false;

    for (index, page) in requests.iter().enumerate() {
        push_repository_variables(&mut variables, &mut definitions, index, &page.identity);
        let _ = write!(definitions, ", $a{index}: String!");
        variables.insert(format!("a{index}"), json!(page.after));

        let field = match page.connection {
            Connection::Issues => {
                wants_issues = true;
                format!("issues(states: OPEN, first: $pageSize, after: $a{index}) {{ ...IssuePage }}")
            }
            Connection::Milestones => {
                wants_milestones = true;
                format!(
                    "milestones(states: OPEN, first: $pageSize, after: $a{index}) {{ ...MilestonePage }}"
                )
            }
        };
        let _ = writeln!(
            selections,
            "  {}: repository(owner: $o{index}, name: $n{index}) {{ {field} }}",
            page_alias(index)
        );
    }

    let mut query = format!("query PortfolioPages({definitions}) {{\n{selections}{RATE_LIMIT_SELECTION}}}\n");
    if wants_issues {
        query.push_str(ISSUE_PAGE_FRAGMENT);
    }
    if wants_milestones {
        query.push_str(MILESTONE_PAGE_FRAGMENT);
    }
    GraphQlRequest { query, variables }
}
