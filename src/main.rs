mod config;
mod github;
mod pr;
mod report;
mod stats;

use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use github::{HttpTransport, Interrupt, Progress, RateLimitedFetcher, WorkerPool};
use pr::{DiffAnnotator, PullRequestLister};
use stats::{ExcludeGlobs, DEFAULT_EXCLUDE_GLOBS};

/// Summarize contributions to a GitHub repository based on its
/// pull requests: lines added and removed per author and per file.
#[derive(Parser, Debug)]
#[command(name = "github-fame", version, about)]
struct Cli {
    /// GitHub repository, in the form 'owner/repo'
    repository: String,

    /// GitHub API token to use for authorization. Use for more relaxed rate limiting
    #[arg(short, long)]
    token: Option<String>,

    /// Include only pull requests created by this user
    #[arg(short = 'a', long)]
    filter_author: Option<String>,

    /// Do not apply the default exclusion globs (package-lock.json, *min.js, *min.css)
    #[arg(short = 'd', long)]
    disable_default_exclude_globs: bool,

    /// Add globs for files to exclude
    #[arg(short = 'e', long, num_args = 0.., action = clap::ArgAction::Append)]
    exclude_glob: Vec<String>,

    /// Exclude specific pull requests by their number from analysis
    #[arg(long, num_args = 0.., action = clap::ArgAction::Append)]
    exclude_pr: Vec<u64>,

    /// Show detailed information about what changes are included
    #[arg(short, long)]
    verbose: bool,

    /// Number of parallel requests to retrieve pull requests and their changes [default: 10]
    #[arg(short = 'n', long)]
    num_parallel_requests: Option<usize>,

    /// Include unmerged pull requests
    #[arg(long)]
    include_unmerged: bool,

    /// Also write the report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "github_fame=debug" } else { "github_fame=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let repo = pr::parse_repository(&cli.repository)?;
    let _main_span = info_span!("github_fame", repo = %repo).entered();

    info!("loading configuration");
    let config = config::Config::load()?;
    debug!(?config, "configuration loaded");

    let mut globs = cli.exclude_glob.clone();
    globs.extend(config.stats.exclude_globs.iter().cloned());
    if !cli.disable_default_exclude_globs {
        globs.extend(DEFAULT_EXCLUDE_GLOBS.iter().map(|g| g.to_string()));
    }
    let excludes = ExcludeGlobs::new(&globs)?;
    info!(globs = ?excludes.patterns(), "using exclude globs");

    let token = config.github_token(cli.token.as_deref());
    if token.is_none() {
        info!("no GitHub token configured, unauthenticated rate limits apply");
    }
    let interrupt = Interrupt::on_ctrl_c();
    let fetcher = RateLimitedFetcher::new(Arc::new(HttpTransport::new()?), token)
        .with_interrupt(interrupt.clone());
    let progress = Arc::new(Progress::dots());
    let pool = WorkerPool::new(
        config.concurrency(cli.num_parallel_requests),
        interrupt,
        Arc::clone(&progress),
    );

    let lister = PullRequestLister::new(fetcher.clone(), pool.clone(), config.api_url());
    let pull_requests = lister
        .list(&repo, cli.filter_author.as_deref())
        .instrument(info_span!("list"))
        .await?;
    info!(count = pull_requests.len(), "found pull requests");
    debug!(numbers = ?pull_requests.iter().map(|pr| pr.number).collect::<Vec<_>>(), "pull request numbers");

    let excluded_numbers: HashSet<u64> = cli.exclude_pr.iter().copied().collect();
    let selection = pr::retain_reviewable(pull_requests, cli.include_unmerged, &excluded_numbers);
    for skipped in &selection.unmerged {
        debug!(pr = skipped.number, author = %skipped.author, title = %skipped.title, "ignoring unmerged pull request");
    }
    if !cli.include_unmerged {
        info!("Ignoring {} unmerged pull requests", selection.unmerged.len());
    }
    if !excluded_numbers.is_empty() {
        info!(
            "Ignoring {} explicitly excluded pull requests",
            selection.explicitly_excluded.len()
        );
    }

    let annotator = DiffAnnotator::new(fetcher, pool);
    let annotated = annotator
        .annotate(selection.kept)
        .instrument(info_span!("annotate"))
        .await?;

    debug!(requests = progress.completed(), "pooled requests completed");

    let statistics = stats::aggregate(&annotated, &excludes);
    info!(authors = statistics.len(), "aggregation complete");

    let built_report = report::build(statistics, cli.verbose);
    report::output(&built_report, cli.output.as_deref())?;

    Ok(())
}
