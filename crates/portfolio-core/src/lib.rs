//! Portfolio Core Library
//!
//! Aggregates health signals for a portfolio of repositories: discovers
//! local working copies, inspects them, fetches their remote counterparts in
//! batched GraphQL requests and scores each project from 0 to 100.

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod github;
pub mod obs;
pub mod remote_url;
pub mod scoring;
pub mod telemetry;

pub use aggregator::Aggregator;

pub use config::{EngineConfig, PortfolioConfig, ProjectEntry, ReportsConfig, Token};

pub use discovery::{discover, DiscoveryOutcome, DiscoveryRequest};

pub use domain::{
    CommitInfo, DiscoveryWarning, Health, HealthStatus, IssueBreakdown, IssuePriority,
    LocalRepositoryError, LocalSnapshot, Milestone, Pillar, PortfolioError, Priority, Project,
    ProjectRecord, RemoteError, RemoteIdentity, RemoteSnapshot, Result, RunReport,
    StalledMilestoneRule,
};

pub use git::{GitInspector, LocalInspector};

pub use github::{BatchedRemoteClient, GraphQlTransport, RemoteFetcher, ReqwestTransport};

pub use remote_url::{parse_remote_url, DEFAULT_REMOTE_HOST};

pub use scoring::{score_project, ScoringPolicy};

pub use telemetry::init_tracing;
