//! Merged, scored per-project records handed to report consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::Project;
use super::snapshot::{LocalSnapshot, RemoteSnapshot};

/// Classification derived from the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// `>= 80` healthy, `60..80` warning, below 60 critical.
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Healthy,
            60..=79 => Self::Warning,
            _ => Self::Critical,
        }
    }
}

/// Score, status and the reasons behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Always within `0..=100`.
    pub score: u8,
    pub status: HealthStatus,
    pub notes: Vec<String>,
}

impl Health {
    pub fn new(score: u8, notes: Vec<String>) -> Self {
        let score = score.min(100);
        Self {
            score,
            status: HealthStatus::from_score(score),
            notes,
        }
    }
}

/// One project with everything the run learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project: Project,
    /// Absent when the project has no local path.
    pub local: Option<LocalSnapshot>,
    /// Absent when the project has no remote identity.
    pub remote: Option<RemoteSnapshot>,
    pub health: Health,
}

/// Output of one aggregation run, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub records: Vec<ProjectRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The run deadline expired before every lookup completed.
    pub timed_out: bool,
}

impl RunReport {
    fn count(&self, status: HealthStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.health.status == status)
            .count()
    }

    pub fn healthy_count(&self) -> usize {
        self.count(HealthStatus::Healthy)
    }

    pub fn warning_count(&self) -> usize {
        self.count(HealthStatus::Warning)
    }

    pub fn critical_count(&self) -> usize {
        self.count(HealthStatus::Critical)
    }

    pub fn record(&self, name: &str) -> Option<&ProjectRecord> {
        self.records.iter().find(|r| r.project.name == name)
    }
}
