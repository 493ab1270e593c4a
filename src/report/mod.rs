pub mod types;

pub use types::{AuthorSummary, Report, TOP_FILES};

use crate::stats::UserStatistics;
use colored::Colorize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Rank authors by total changes, then by pull request count, then by login
/// so that equal authors always come out in the same order.
///
/// Unless `all_files` is set, each author keeps only their `TOP_FILES` most
/// changed files.
pub fn build(statistics: HashMap<String, UserStatistics>, all_files: bool) -> Report {
    let mut ranked: Vec<(String, UserStatistics)> = statistics.into_iter().collect();
    ranked.sort_by(|(author_a, a), (author_b, b)| {
        b.ranking_key()
            .cmp(&a.ranking_key())
            .then_with(|| author_a.cmp(author_b))
    });

    let authors = ranked
        .into_iter()
        .map(|(author, stats)| {
            let mut files = stats.ranked_files();
            let files_changed = files.len();
            if !all_files {
                files.truncate(TOP_FILES);
            }
            AuthorSummary {
                author,
                pull_requests: stats.pull_requests,
                total: stats.total_changes(),
                average: stats.average_per_pull_request(),
                files,
                files_changed,
            }
        })
        .collect();

    Report { authors, all_files }
}

/// Print the report to the terminal and, if `output_path` is given, also
/// write it there as plain text.
#[instrument(skip(report), fields(authors = report.authors.len()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    debug!("writing report to terminal");
    print_terminal_report(report);

    if let Some(path) = output_path {
        debug!(path = %path.display(), "writing report to file");
        std::fs::write(path, render_plain(report))?;
    }
    Ok(())
}

fn files_heading(report: &Report, summary: &AuthorSummary) -> String {
    if report.all_files {
        "Files changed:".to_string()
    } else {
        format!(
            "Top {} files changed (out of {}):",
            TOP_FILES, summary.files_changed
        )
    }
}

/// alice: 3 PRs. Total changes: (+320, -45). Average per PR: (+106.7, -15.0)
/// Top 5 files changed (out of 7):
///     src/auth/login.rs (+200, -10)
///     ...
fn print_terminal_report(report: &Report) {
    println!();
    if report.authors.is_empty() {
        println!("No pull requests to report.");
        return;
    }

    for summary in &report.authors {
        println!(
            "{}: {} PRs. Total changes: {}. Average per PR: {}",
            summary.author.bold(),
            summary.pull_requests,
            colorize_stats(summary.total.additions as f64, summary.total.deletions as f64, 0),
            colorize_stats(summary.average.0, summary.average.1, 1),
        );
        println!("{}", files_heading(report, summary));
        for (path, stats) in &summary.files {
            println!("    {} {}", path, stats);
        }
        println!();
    }
}

fn render_plain(report: &Report) -> String {
    let mut text = String::new();
    for summary in &report.authors {
        let _ = writeln!(
            text,
            "{}: {} PRs. Total changes: {}. Average per PR: (+{:.1}, -{:.1})",
            summary.author, summary.pull_requests, summary.total, summary.average.0, summary.average.1
        );
        let _ = writeln!(text, "{}", files_heading(report, summary));
        for (path, stats) in &summary.files {
            let _ = writeln!(text, "    {} {}", path, stats);
        }
        text.push('\n');
    }
    text
}

/// `(+A, -D)` with additions in green and deletions in red.
fn colorize_stats(additions: f64, deletions: f64, precision: usize) -> String {
    format!(
        "({}, {})",
        format!("+{:.*}", precision, additions).green(),
        format!("-{:.*}", precision, deletions).red()
    )
}
