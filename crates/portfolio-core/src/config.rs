//! Engine and portfolio configuration.
//!
//! [`EngineConfig`] is built once at startup (normally via
//! [`EngineConfig::from_env`]) and handed to every component explicitly.
//! [`PortfolioConfig`] is the optional TOML file listing static projects and
//! discovery defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryRequest;
use crate::domain::{
    Pillar, PortfolioError, Priority, Project, RemoteIdentity, Result, StalledMilestoneRule,
};
use crate::remote_url::DEFAULT_REMOTE_HOST;

pub const DEFAULT_API_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 90;
/// Upper bound for `lookback_days` (a century).
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Secret credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Everything the engine needs to run, resolved up front.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub token: Token,
    /// GraphQL endpoint.
    pub api_url: String,
    /// Host whose remotes map to `owner/repo` identities.
    pub remote_host: String,
    /// Commits newer than this count as recent activity.
    pub lookback_days: u32,
    /// Repository aliases per GraphQL request.
    pub batch_size: usize,
    /// Nodes per connection page.
    pub page_size: u32,
    /// Pages fetched per connection before marking a snapshot truncated.
    pub max_pages: u32,
    /// Retries for transient failures of one request.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Rate-limit pauses tolerated for one request.
    pub max_rate_limit_waits: u32,
    /// Overall budget for a run.
    pub deadline: Duration,
    /// Concurrent blocking local inspections.
    pub local_workers: usize,
    /// Roadmap file looked up on the remote default branch.
    pub roadmap_path: String,
    pub stalled_rule: StalledMilestoneRule,
}

impl EngineConfig {
    /// Defaults for everything except the credential.
    pub fn new(token: Token) -> Self {
        Self {
            token,
            api_url: DEFAULT_API_URL.to_string(),
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            batch_size: 20,
            page_size: 100,
            max_pages: 10,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(60),
            max_rate_limit_waits: 8,
            deadline: Duration::from_secs(120),
            local_workers: 8,
            roadmap_path: "ROADMAP.md".to_string(),
            stalled_rule: StalledMilestoneRule::DuePassed,
        }
    }

    /// Build from environment variables.
    ///
    /// `GITHUB_TOKEN` is required. Optional overrides:
    /// `PORTFOLIO_GITHUB_API_URL`, `PORTFOLIO_LOOKBACK_DAYS`,
    /// `PORTFOLIO_DEADLINE_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("GITHUB_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PortfolioError::Configuration(
                    "GITHUB_TOKEN is not set; a GitHub token is required before any remote query"
                        .to_string(),
                )
            })?;

        let mut config = Self::new(Token::new(token));
        if let Some(url) = lookup("PORTFOLIO_GITHUB_API_URL").filter(|u| !u.is_empty()) {
            config.api_url = url;
        }
        if let Some(days) = lookup("PORTFOLIO_LOOKBACK_DAYS") {
            config.lookback_days = parse_number("PORTFOLIO_LOOKBACK_DAYS", &days)?;
        }
        if let Some(secs) = lookup("PORTFOLIO_DEADLINE_SECS") {
            config.deadline = Duration::from_secs(parse_number("PORTFOLIO_DEADLINE_SECS", &secs)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Reject values that would stall or break the client.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PortfolioError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(PortfolioError::Configuration(
                "page_size must be within 1..=100".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(PortfolioError::Configuration(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(PortfolioError::Configuration(format!(
                "lookback_days must be at most {MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        if self.local_workers == 0 {
            return Err(PortfolioError::Configuration(
                "local_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PortfolioError::Configuration(format!("{key} is not a number: '{value}'")))
}

/// `[reports]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_lookback")]
    pub commit_lookback_days: u32,
}

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            commit_lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// One `[[projects]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `owner/repo`.
    #[serde(default)]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub pillar: Pillar,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
}

/// The portfolio file.
///
/// ```toml
/// [reports]
/// commit_lookback_days = 30
///
/// [discovery]
/// root = "~/src"
/// exclude = ["archive"]
///
/// [[projects]]
/// name = "billing"
/// path = "/src/billing"
/// github_repo = "acme/billing"
/// pillar = "revenue"
/// priority = "critical"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub discovery: Option<DiscoveryRequest>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

impl PortfolioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        let mut names = std::collections::HashSet::new();
        for entry in &config.projects {
            if !names.insert(entry.name.as_str()) {
                return Err(PortfolioError::Configuration(format!(
                    "duplicate project name '{}'",
                    entry.name
                )));
            }
        }
        Ok(config)
    }

    /// Static project list in file order.
    pub fn projects(&self) -> Result<Vec<Project>> {
        self.projects
            .iter()
            .map(|entry| {
                let remote_identity = match entry.github_repo.as_deref() {
                    None | Some("") => None,
                    Some(repo) => Some(repo.parse::<RemoteIdentity>().map_err(|e| {
                        PortfolioError::Configuration(format!("project '{}': {e}", entry.name))
                    })?),
                };
                Ok(Project {
                    name: entry.name.clone(),
                    local_path: entry.path.clone(),
                    remote_identity,
                    pillar: entry.pillar,
                    priority: entry.priority,
                    description: entry.description.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, PortfolioError::Configuration(_)));
        let err = EngineConfig::from_lookup(lookup(&[("GITHUB_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, PortfolioError::Configuration(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_secret"),
            ("PORTFOLIO_LOOKBACK_DAYS", "30"),
            ("PORTFOLIO_DEADLINE_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.token.expose(), "ghp_secret");
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.deadline, Duration::from_secs(5));
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "t"),
            ("PORTFOLIO_LOOKBACK_DAYS", "ninety"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORTFOLIO_LOOKBACK_DAYS"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let config = EngineConfig::new(Token::new("ghp_secret"));
        assert!(!format!("{config:?}").contains("ghp_secret"));
    }

    #[test]
    fn test_validate_bounds_lookback() {
        let config = EngineConfig::new(Token::new("t")).with_lookback_days(200_000_000);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lookback_days"));

        let config = EngineConfig::new(Token::new("t")).with_lookback_days(MAX_LOOKBACK_DAYS);
        assert!(config.validate().is_ok());

        let err = EngineConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "t"),
            ("PORTFOLIO_LOOKBACK_DAYS", "200000000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PortfolioError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = EngineConfig::new(Token::new("t")).with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_portfolio_config_parses_projects() {
        let config = PortfolioConfig::parse(
            r#"
            [reports]
            commit_lookback_days = 30

            [discovery]
            root = "/src"
            exclude = ["archive"]

            [[projects]]
            name = "billing"
            path = "/src/billing"
            github_repo = "acme/billing"
            pillar = "revenue"
            priority = "critical"
            description = "Invoices"

            [[projects]]
            name = "sketches"
            pillar = "whatever"
            "#,
        )
        .unwrap();

        assert_eq!(config.reports.commit_lookback_days, 30);
        let discovery = config.discovery.as_ref().unwrap();
        assert!(discovery.exclude.contains("archive"));
        assert_eq!(discovery.remote_host, DEFAULT_REMOTE_HOST);

        let projects = config.projects().unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].pillar, Pillar::Revenue);
        assert_eq!(projects[0].priority, Priority::Critical);
        assert_eq!(
            projects[0].remote_identity.as_ref().unwrap().to_string(),
            "acme/billing"
        );
        assert_eq!(projects[1].pillar, Pillar::Unknown);
        assert_eq!(projects[1].priority, Priority::Unknown);
        assert!(projects[1].remote_identity.is_none());
    }

    #[test]
    fn test_portfolio_config_rejects_bad_identity_and_duplicates() {
        let config = PortfolioConfig::parse(
            r#"
            [[projects]]
            name = "x"
            github_repo = "not-an-identity"
            "#,
        )
        .unwrap();
        assert!(config.projects().is_err());

        let dup = PortfolioConfig::parse(
            r#"
            [[projects]]
            name = "x"
            [[projects]]
            name = "x"
            "#,
        );
        assert!(dup.is_err());
    }
}
