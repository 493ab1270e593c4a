use tracing::{debug, info, instrument};

use super::diff::parse_diff;
use super::types::{AnnotatedPullRequest, PullRequest};
use crate::github::{GitHubError, RateLimitedFetcher, WorkerPool, DIFF_MEDIA_TYPE};

/// Downloads and parses the diff of every pull request through the worker pool.
pub struct DiffAnnotator {
    fetcher: RateLimitedFetcher,
    pool: WorkerPool,
}

impl DiffAnnotator {
    pub fn new(fetcher: RateLimitedFetcher, pool: WorkerPool) -> Self {
        Self { fetcher, pool }
    }

    /// Output order matches `pull_requests`. The first fetch or parse failure
    /// aborts the whole batch.
    #[instrument(skip_all, fields(pull_requests = pull_requests.len()))]
    pub async fn annotate(
        &self,
        pull_requests: Vec<PullRequest>,
    ) -> Result<Vec<AnnotatedPullRequest>, GitHubError> {
        info!(
            "Getting changes for {} pull requests using {} parallel connections",
            pull_requests.len(),
            self.pool.workers()
        );

        let fetcher = self.fetcher.clone();
        let annotated = self
            .pool
            .run(pull_requests, move |pull_request| {
                let fetcher = fetcher.clone();
                async move { annotate_one(&fetcher, pull_request).await }
            })
            .await?;
        self.pool.progress().finish();

        Ok(annotated)
    }
}

async fn annotate_one(
    fetcher: &RateLimitedFetcher,
    pull_request: PullRequest,
) -> Result<AnnotatedPullRequest, GitHubError> {
    let response = fetcher.fetch(&pull_request.diff_url, DIFF_MEDIA_TYPE).await?;
    let changes = parse_diff(&response.body).map_err(|err| match err {
        GitHubError::DiffParse(reason) => {
            GitHubError::DiffParse(format!("PR #{}: {}", pull_request.number, reason))
        }
        other => other,
    })?;
    debug!(pr = pull_request.number, files = changes.len(), "parsed diff");

    Ok(AnnotatedPullRequest {
        pull_request,
        changes,
    })
}
