//! Penalty-based health scoring.
//!
//! Scoring is a pure function of the two snapshots, the policy and the clock.
//! It starts at 100, subtracts each triggered penalty once and clamps to
//! `0..=100`. Facts come only from snapshots that are usable; a failed
//! source adds a note but no penalty of its own.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::domain::{CommitInfo, Health, LocalSnapshot, RemoteSnapshot, StalledMilestoneRule};

const PENALTY_NO_COMMITS: i32 = 30;
const PENALTY_COMMIT_OVER_90_DAYS: i32 = 30;
const PENALTY_COMMIT_OVER_30_DAYS: i32 = 15;
/// Light band starts after two weeks, not one: a ten-day-old commit must still
/// score 100.
const PENALTY_COMMIT_OVER_14_DAYS: i32 = 5;
const PENALTY_NO_ROADMAP: i32 = 20;
const PENALTY_ISSUES_50: i32 = 20;
const PENALTY_ISSUES_20: i32 = 10;
const PENALTY_STALLED_MILESTONE: i32 = 15;
const PENALTY_UNCOMMITTED: i32 = 15;

pub const NOTE_ALL_HEALTHY: &str = "All metrics healthy";
pub const NOTE_NO_DATA: &str = "No data could be gathered";

/// Knobs of the scorer that vary between portfolios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub stalled_rule: StalledMilestoneRule,
}

impl ScoringPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            stalled_rule: config.stalled_rule,
        }
    }
}

struct Tally {
    score: i32,
    notes: Vec<String>,
}

impl Tally {
    fn penalize(&mut self, points: i32, note: String) {
        self.score -= points;
        self.notes.push(note);
    }
}

/// Score one project from whatever its sources produced.
///
/// `None` means the source does not apply to the project (no local path, no
/// remote identity). A snapshot carrying an error is present but unusable.
pub fn score_project(
    local: Option<&LocalSnapshot>,
    remote: Option<&RemoteSnapshot>,
    policy: &ScoringPolicy,
    now: DateTime<Utc>,
) -> Health {
    let usable_local = local.filter(|l| !l.is_unusable());
    let usable_remote = remote.filter(|r| !r.is_unusable());

    if usable_local.is_none() && usable_remote.is_none() {
        let mut notes = vec![NOTE_NO_DATA.to_string()];
        notes.extend(source_notes(local, remote));
        return Health::new(0, notes);
    }

    let mut tally = Tally {
        score: 100,
        notes: Vec::new(),
    };

    match latest_commit(usable_local, usable_remote) {
        None => tally.penalize(
            PENALTY_NO_COMMITS,
            "No commits found in repository history".to_string(),
        ),
        Some(commit) => {
            let age = commit.age_days(now);
            if age > 90 {
                tally.penalize(
                    PENALTY_COMMIT_OVER_90_DAYS,
                    format!("Last commit {age} days ago (over 90 days)"),
                );
            } else if age > 30 {
                tally.penalize(
                    PENALTY_COMMIT_OVER_30_DAYS,
                    format!("Last commit {age} days ago (over 30 days)"),
                );
            } else if age > 14 {
                tally.penalize(
                    PENALTY_COMMIT_OVER_14_DAYS,
                    format!("Last commit {age} days ago (over 2 weeks)"),
                );
            }
        }
    }

    let has_roadmap = match (usable_remote, usable_local) {
        (Some(remote), _) => Some(remote.has_roadmap_file),
        (None, Some(local)) => Some(local.roadmap_path.is_some()),
        (None, None) => None,
    };
    if has_roadmap == Some(false) {
        tally.penalize(PENALTY_NO_ROADMAP, "No roadmap file found".to_string());
    }

    if let Some(remote) = usable_remote {
        let open = remote.open_issue_count;
        if open >= 50 {
            tally.penalize(PENALTY_ISSUES_50, format!("{open} open issues (50 or more)"));
        } else if open >= 20 {
            tally.penalize(PENALTY_ISSUES_20, format!("{open} open issues (20 or more)"));
        }

        let stalled: Vec<&str> = remote
            .milestones
            .iter()
            .filter(|m| m.is_stalled(policy.stalled_rule, now))
            .map(|m| m.title.as_str())
            .collect();
        if !stalled.is_empty() {
            tally.penalize(
                PENALTY_STALLED_MILESTONE,
                format!("Stalled milestones: {}", stalled.join(", ")),
            );
        }
    }

    if usable_local.is_some_and(|l| l.has_uncommitted_changes) {
        tally.penalize(
            PENALTY_UNCOMMITTED,
            "Uncommitted changes in working tree".to_string(),
        );
    }

    tally.notes.extend(source_notes(local, remote));
    if tally.notes.is_empty() {
        tally.notes.push(NOTE_ALL_HEALTHY.to_string());
    }

    let score = tally.score.clamp(0, 100) as u8;
    Health::new(score, tally.notes)
}

fn latest_commit<'a>(
    local: Option<&'a LocalSnapshot>,
    remote: Option<&'a RemoteSnapshot>,
) -> Option<&'a CommitInfo> {
    let local = local.and_then(|l| l.latest_commit.as_ref());
    let remote = remote.and_then(|r| r.latest_commit.as_ref());
    local.into_iter().chain(remote).max_by_key(|c| c.committed_at)
}

fn source_notes(local: Option<&LocalSnapshot>, remote: Option<&RemoteSnapshot>) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(error) = local.and_then(|l| l.error.as_ref()) {
        notes.push(format!("Local: {error}"));
    }
    if let Some(remote) = remote {
        if let Some(error) = &remote.error {
            notes.push(format!("Remote: {error}"));
        }
        if remote.truncated {
            notes.push("Remote: issue or milestone list truncated at page cap".to_string());
        }
    }
    notes
}
