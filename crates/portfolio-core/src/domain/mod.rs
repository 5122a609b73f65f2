//! Domain models for the portfolio engine.
//!
//! Canonical definitions for the core entities:
//! - `Project`: one member of the portfolio, immutable for a run
//! - `LocalSnapshot` / `RemoteSnapshot`: point-in-time reads of each source
//! - `ProjectRecord`: the merged, scored view of a project
//! - `RunReport`: every record from one run, in input order

pub mod error;
pub mod project;
pub mod record;
pub mod snapshot;

// Re-export main types and errors
pub use error::{DiscoveryWarning, LocalRepositoryError, PortfolioError, RemoteError, Result};
pub use project::{Pillar, Priority, Project, RemoteIdentity};
pub use record::{Health, HealthStatus, ProjectRecord, RunReport};
pub use snapshot::{
    CommitInfo, IssueBreakdown, IssuePriority, LocalSnapshot, Milestone, RemoteSnapshot,
    StalledMilestoneRule,
};
