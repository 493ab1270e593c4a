pub mod fetcher;
pub mod pagination;
pub mod pool;

#[cfg(test)]
pub mod testing;

pub use fetcher::{HttpTransport, RateLimitedFetcher};
pub use pagination::{PageExtractor, PaginatedCollector};
pub use pool::{Interrupt, Progress, WorkerPool};

use thiserror::Error;

/// Default REST endpoint; overridable for GitHub Enterprise installs.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Media type for JSON API payloads.
pub const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Media type that makes the pulls endpoint answer with a unified diff.
pub const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned HTTP {status} for {uri}: {message}")]
    Status {
        status: u16,
        uri: String,
        message: String,
    },

    #[error("Failed to decode GitHub API response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "GitHub reported {count} results, but the search API will only retrieve the first 1000 results"
    )]
    ResultLimitExceeded { count: u64 },

    #[error("Failed to parse diff: {0}")]
    DiffParse(String),

    #[error("Invalid repository: {0} (expected owner/name)")]
    InvalidRepository(String),

    #[error("Interrupted before all requests completed")]
    Interrupted,

    #[error("Worker task panicked: {0}")]
    WorkerPanicked(#[from] tokio::task::JoinError),
}
