//! Point-in-time reads of one data source for one project.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::{LocalRepositoryError, RemoteError};

/// The newest commit seen by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full object id.
    pub sha: String,
    pub author: String,
    /// First line of the commit message.
    pub message: String,
    pub committed_at: DateTime<Utc>,
}

impl CommitInfo {
    /// Seven-character abbreviated id.
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }

    /// Whole days elapsed since the commit. Commits in the future count as 0.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.committed_at).num_days().max(0)
    }
}

/// Read of a local working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    pub latest_commit: Option<CommitInfo>,
    /// Current branch name, `DETACHED` for a detached HEAD.
    pub branch: Option<String>,
    /// Staged, unstaged or untracked changes present.
    pub has_uncommitted_changes: bool,
    pub roadmap_path: Option<PathBuf>,
    pub error: Option<LocalRepositoryError>,
}

impl LocalSnapshot {
    pub fn failed(error: LocalRepositoryError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// True when the snapshot carries no usable facts at all.
    ///
    /// A repository with zero commits is still a fact (and a penalty), so
    /// `NoCommits` keeps the snapshot usable.
    pub fn is_unusable(&self) -> bool {
        match self.error {
            None | Some(LocalRepositoryError::NoCommits) => false,
            Some(_) => self.latest_commit.is_none(),
        }
    }
}

/// Priority bucket derived from an issue's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Critical,
    High,
    Medium,
    Low,
    None,
}

impl IssuePriority {
    /// First label that names a priority wins.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        for label in labels {
            let label = label.to_ascii_lowercase();
            if label.contains("critical") || label.contains("p0") {
                return Self::Critical;
            }
            if label.contains("high") || label.contains("p1") {
                return Self::High;
            }
            if label.contains("medium") || label.contains("p2") {
                return Self::Medium;
            }
            if label.contains("low") || label.contains("p3") {
                return Self::Low;
            }
        }
        Self::None
    }
}

/// Count of fetched open issues per priority bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueBreakdown {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub none: u32,
}

impl IssueBreakdown {
    pub fn record(&mut self, priority: IssuePriority) {
        match priority {
            IssuePriority::Critical => self.critical += 1,
            IssuePriority::High => self.high += 1,
            IssuePriority::Medium => self.medium += 1,
            IssuePriority::Low => self.low += 1,
            IssuePriority::None => self.none += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low + self.none
    }
}

/// Which milestones count as stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StalledMilestoneRule {
    /// Due date passed with completion below 100%.
    #[default]
    DuePassed,
    /// `DuePassed`, plus milestones at 0% with open issues whose last update
    /// is older than `stall_days`.
    DuePassedOrNoProgress { stall_days: u32 },
}

/// One open milestone of a remote repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub percent_complete: f64,
    pub closed_count: u32,
    pub total_count: u32,
    pub due_on: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn open_count(&self) -> u32 {
        self.total_count.saturating_sub(self.closed_count)
    }

    pub fn is_complete(&self) -> bool {
        self.percent_complete >= 100.0
    }

    pub fn is_stalled(&self, rule: StalledMilestoneRule, now: DateTime<Utc>) -> bool {
        let overdue = self.due_on.is_some_and(|due| due < now) && !self.is_complete();
        match rule {
            StalledMilestoneRule::DuePassed => overdue,
            StalledMilestoneRule::DuePassedOrNoProgress { stall_days } => {
                let idle = self.percent_complete <= 0.0
                    && self.open_count() > 0
                    && self
                        .updated_at
                        .is_some_and(|at| now - at > Duration::days(i64::from(stall_days)));
                overdue || idle
            }
        }
    }
}

/// Read of the remote provider for one `owner/repo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub default_branch: Option<String>,
    pub latest_commit: Option<CommitInfo>,
    /// Commits on the default branch inside the lookback window.
    pub recent_commit_count: u32,
    pub has_roadmap_file: bool,
    pub open_issue_count: u32,
    pub issues_by_priority: IssueBreakdown,
    pub milestones: Vec<Milestone>,
    pub open_pull_requests: u32,
    /// Pagination hit the safety cap; lists above are incomplete.
    pub truncated: bool,
    pub error: Option<RemoteError>,
}

impl RemoteSnapshot {
    pub fn failed(error: RemoteError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_unusable(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    fn milestone(percent: f64, due_days: Option<i64>) -> Milestone {
        Milestone {
            title: "v1".to_string(),
            percent_complete: percent,
            closed_count: 0,
            total_count: 4,
            due_on: due_days.map(|d| now() + Duration::days(d)),
            updated_at: Some(now() - Duration::days(60)),
        }
    }

    #[test]
    fn test_overdue_incomplete_milestone_is_stalled() {
        assert!(milestone(50.0, Some(-1)).is_stalled(StalledMilestoneRule::DuePassed, now()));
    }

    #[test]
    fn test_complete_or_future_milestone_is_not_stalled() {
        let rule = StalledMilestoneRule::DuePassed;
        assert!(!milestone(100.0, Some(-10)).is_stalled(rule, now()));
        assert!(!milestone(10.0, Some(5)).is_stalled(rule, now()));
        assert!(!milestone(0.0, None).is_stalled(rule, now()));
    }

    #[test]
    fn test_no_progress_rule_is_opt_in() {
        let idle = milestone(0.0, None);
        assert!(!idle.is_stalled(StalledMilestoneRule::DuePassed, now()));
        assert!(idle.is_stalled(
            StalledMilestoneRule::DuePassedOrNoProgress { stall_days: 30 },
            now()
        ));
    }

    #[test]
    fn test_issue_priority_from_labels() {
        assert_eq!(IssuePriority::from_labels(["bug", "P1"]), IssuePriority::High);
        assert_eq!(
            IssuePriority::from_labels(["Critical", "low"]),
            IssuePriority::Critical
        );
        assert_eq!(IssuePriority::from_labels(["docs"]), IssuePriority::None);
    }

    #[test]
    fn test_empty_repository_is_still_usable() {
        assert!(!LocalSnapshot::failed(LocalRepositoryError::NoCommits).is_unusable());
        assert!(LocalSnapshot::failed(LocalRepositoryError::Timeout).is_unusable());
        assert!(!LocalSnapshot::default().is_unusable());
    }

    #[test]
    fn test_commit_age_days() {
        let commit = CommitInfo {
            sha: "0123456789abcdef".to_string(),
            author: "dev".to_string(),
            message: "fix".to_string(),
            committed_at: now() - Duration::days(10),
        };
        assert_eq!(commit.age_days(now()), 10);
        assert_eq!(commit.short_sha(), "0123456");
    }
}
