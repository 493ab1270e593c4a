pub mod types;

pub use types::{ChangeStats, UserStatistics};

use glob::{MatchOptions, Pattern, PatternError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::pr::AnnotatedPullRequest;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Invalid exclude glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: PatternError,
    },
    #[error("Exclude glob {pattern:?} names no path")]
    EmptyGlob { pattern: String },
}

/// Generated or vendored files that would otherwise dominate the numbers.
pub const DEFAULT_EXCLUDE_GLOBS: [&str; 3] = ["package-lock.json", "*min.js", "*min.css"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
struct ExcludePattern {
    source: String,
    pattern: Pattern,
    /// Matched against the whole path instead of its trailing components.
    anchored: bool,
    components: usize,
}

impl ExcludePattern {
    fn new(source: &str) -> Result<Self, StatsError> {
        let anchored = source.starts_with('/') || source.contains("**");
        let body = source.trim_start_matches('/');
        if body.trim().is_empty() {
            return Err(StatsError::EmptyGlob {
                pattern: source.to_string(),
            });
        }
        let pattern = Pattern::new(body).map_err(|err| StatsError::InvalidGlob {
            pattern: source.to_string(),
            source: err,
        })?;

        Ok(Self {
            source: source.to_string(),
            pattern,
            anchored,
            components: body.split('/').filter(|part| !part.is_empty()).count(),
        })
    }

    fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        if self.anchored {
            return self.pattern.matches_with(path, MATCH_OPTIONS);
        }

        let components: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        if components.len() < self.components {
            return false;
        }
        let tail = components[components.len() - self.components..].join("/");
        self.pattern.matches_with(&tail, MATCH_OPTIONS)
    }
}

/// File globs whose matches are left out of the statistics.
///
/// A relative pattern without `**` is matched against the last path
/// components, as many as the pattern has: `package-lock.json` excludes
/// `web/package-lock.json` and `*min.js` excludes `dist/app.min.js`, while `*`
/// never crosses a `/`. Patterns starting with `/` or containing `**` are
/// matched against the whole path, and `**` spans any number of directories.
#[derive(Debug, Default)]
pub struct ExcludeGlobs {
    patterns: Vec<ExcludePattern>,
}

impl ExcludeGlobs {
    pub fn new<I, S>(patterns: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| ExcludePattern::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.source.as_str()).collect()
    }
}

/// Reduce annotated pull requests into per-author statistics.
///
/// Every pull request counts towards its author's total even when all of its
/// files are excluded. Changes are bucketed by the path after the change, so a
/// renamed file keeps accumulating under its new name.
pub fn aggregate(
    pull_requests: &[AnnotatedPullRequest],
    excludes: &ExcludeGlobs,
) -> HashMap<String, UserStatistics> {
    let mut statistics: HashMap<String, UserStatistics> = HashMap::new();

    for annotated in pull_requests {
        let pr = &annotated.pull_request;
        debug!(pr = pr.number, author = %pr.author, title = %pr.title, "checking pull request");

        let user = statistics.entry(pr.author.clone()).or_default();
        user.pull_requests += 1;

        for change in &annotated.changes {
            let stats = ChangeStats::new(change.additions, change.deletions);
            if excludes.is_excluded(&change.path) {
                debug!(path = %change.path, %stats, "ignoring excluded file");
                continue;
            }
            debug!(path = %change.path, %stats, "counting file");
            *user.files.entry(change.path.clone()).or_default() += stats;
        }
    }

    statistics
}
