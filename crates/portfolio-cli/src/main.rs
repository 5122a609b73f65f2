//! Portfolio health CLI
//!
//! The `portfolio` command gathers local and remote health signals for every
//! project in the portfolio and prints the scored records as JSON.
//!
//! Projects come from `--discover DIR`, the `[discovery]` table of the
//! config file, or the file's static `[[projects]]` list. When discovery
//! finds nothing, the static list is used instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use portfolio_core::{
    discover, Aggregator, DiscoveryRequest, EngineConfig, PortfolioConfig, Project,
};

#[derive(Parser)]
#[command(name = "portfolio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Health report for a portfolio of git repositories", long_about = None)]
struct Cli {
    /// Portfolio file (TOML) with static projects and discovery defaults
    #[arg(short, long, env = "PORTFOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Scan this directory for repositories instead of the static list
    #[arg(short, long)]
    discover: Option<PathBuf>,

    /// Directory names to skip during discovery
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Also consider hidden directories during discovery
    #[arg(long)]
    include_hidden: bool,

    /// Days of history that count as recent activity
    #[arg(long)]
    lookback: Option<u32>,

    /// Overall run deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    portfolio_core::init_tracing(cli.json, level);

    // The credential is checked before anything touches the disk or network.
    let mut engine = EngineConfig::from_env()?;

    let file = match &cli.config {
        Some(path) => PortfolioConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PortfolioConfig::default(),
    };

    if let Some(days) = cli
        .lookback
        .or(cli.config.as_ref().map(|_| file.reports.commit_lookback_days))
    {
        engine = engine.with_lookback_days(days);
    }
    if let Some(secs) = cli.deadline {
        engine = engine.with_deadline(Duration::from_secs(secs));
    }

    let projects = select_projects(&cli, &file, &engine)?;
    if projects.is_empty() {
        bail!("no projects to report on: pass --discover DIR or list [[projects]] in --config");
    }
    info!(projects = projects.len(), "starting portfolio run");

    let aggregator = Aggregator::from_config(Arc::new(engine))?;
    let report = aggregator.run(projects).await?;

    info!(
        healthy = report.healthy_count(),
        warning = report.warning_count(),
        critical = report.critical_count(),
        timed_out = report.timed_out,
        "portfolio run complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn select_projects(
    cli: &Cli,
    file: &PortfolioConfig,
    engine: &EngineConfig,
) -> Result<Vec<Project>> {
    let static_projects = file.projects()?;

    let mut request = match (&cli.discover, &file.discovery) {
        (Some(root), _) => DiscoveryRequest::new(root).remote_host(engine.remote_host.clone()),
        (None, Some(request)) => request.clone(),
        (None, None) => return Ok(static_projects),
    };
    if cli.include_hidden {
        request = request.include_hidden(true);
    }
    for name in &cli.exclude {
        request = request.exclude(name.clone());
    }

    let outcome = discover(&request)
        .with_context(|| format!("failed to scan {}", request.root.display()))?;
    for warning in &outcome.warnings {
        warn!(%warning, "discovery skipped an entry");
    }

    if outcome.is_empty() {
        warn!(
            root = %request.root.display(),
            fallback = static_projects.len(),
            "discovery found no repositories; using static project list"
        );
        return Ok(static_projects);
    }
    Ok(outcome.projects)
}
