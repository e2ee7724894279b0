mod config;
mod enrich;
mod github;
mod pr;
mod report;

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::github::{GithubClient, Session};

/// Contribution report — lists every merged pull request you authored against
/// other people's repositories, grouped by repository with star counts, as
/// markdown.
#[derive(Parser, Debug)]
#[command(name = "contrib-report", version, about)]
struct Cli {
    /// GitHub token (falls back to the config file, then GITHUB_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Config file path (default: .contrib-report.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for the markdown report (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("loading configuration");
    let config = Config::load(cli.config.as_deref())?;

    let token = cli
        .token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| config.github_token())
        .unwrap_or_default();
    let client = GithubClient::new(token, &config.client_options())?;
    let session = Arc::new(Session::new(Arc::new(client), config.fetch.clone()));

    run(session, &config, cli.output.as_deref()).await
}

#[instrument(skip_all)]
async fn run(
    session: Arc<Session>,
    config: &Config,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("fetching merged pull requests");
    let mut records = pr::fetch_all(Arc::clone(&session)).await?;

    info!("enriching repositories with star counts");
    let outcome = enrich::enrich(&session, &mut records).await?;
    info!(resolved = outcome.resolved, failed = outcome.failures.len(), "star counts attached");

    info!("generating report");
    let built = report::build(records, &config.ignore_list(), config.side_projects.clone());
    report::output(&built, output)?;

    eprintln!(
        "{} {} merged PRs across {} repositories",
        "✓".green().bold(),
        built.pull_requests.len(),
        built.repository_count()
    );
    if !outcome.failures.is_empty() {
        eprintln!(
            "{} {} star lookups unresolved (shown as ★?)",
            "!".yellow().bold(),
            outcome.failures.len()
        );
    }
    Ok(())
}
