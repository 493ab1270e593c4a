use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::fetcher::{ApiResponse, RateLimitedFetcher};
use super::pool::WorkerPool;
use super::{GitHubError, JSON_MEDIA_TYPE};

/// Turns the body of one result page into typed items.
///
/// Implementations are selected by the caller per endpoint, since GitHub's
/// list and search endpoints wrap the same records differently.
pub trait PageExtractor: Send + Sync + 'static {
    type Item: Send + 'static;

    fn extract(&self, body: &str) -> Result<Vec<Self::Item>, GitHubError>;
}

/// Fetches every page of a paginated endpoint, page 1 first and the rest
/// through the worker pool.
pub struct PaginatedCollector {
    fetcher: RateLimitedFetcher,
    pool: WorkerPool,
}

impl PaginatedCollector {
    pub fn new(fetcher: RateLimitedFetcher, pool: WorkerPool) -> Self {
        Self { fetcher, pool }
    }

    /// `base_uri` must already carry a query string; pages are requested as
    /// `base_uri&page=N`. Items come back in page order, then in the order
    /// each page lists them.
    #[instrument(skip(self, extractor))]
    pub async fn collect_all<E>(&self, base_uri: &str, extractor: E) -> Result<Vec<E::Item>, GitHubError>
    where
        E: PageExtractor,
    {
        let first = self.fetcher.fetch(base_uri, JSON_MEDIA_TYPE).await?;
        let last_page = last_page(&first);

        info!(
            "Collecting paginated result, requires {} more requests, using {} parallel connections",
            last_page - 1,
            self.pool.workers()
        );

        let mut items = extractor.extract(&first.body)?;
        if last_page == 1 {
            return Ok(items);
        }

        let extractor = Arc::new(extractor);
        let fetcher = self.fetcher.clone();
        let base = base_uri.to_string();
        let pages = self
            .pool
            .run((2..=last_page).collect::<Vec<usize>>(), move |page| {
                let fetcher = fetcher.clone();
                let extractor = Arc::clone(&extractor);
                let uri = format!("{}&page={}", base, page);
                async move {
                    let response = fetcher.fetch(&uri, JSON_MEDIA_TYPE).await?;
                    extractor.extract(&response.body)
                }
            })
            .await?;
        self.pool.progress().finish();

        for page in pages {
            items.extend(page);
        }
        debug!(items = items.len(), pages = last_page, "pagination complete");
        Ok(items)
    }
}

/// Page count advertised by the `Link` header; 1 when there is no `last` link.
pub fn last_page(response: &ApiResponse) -> usize {
    response
        .header("link")
        .and_then(|link| parse_link_header(link, "last"))
        .and_then(|uri| page_number(&uri))
        .unwrap_or(1)
        .max(1)
}

/// Finds the URI for `rel` in a header such as
/// `<https://api.github.com/...&page=2>; rel="next", <...&page=5>; rel="last"`.
pub fn parse_link_header(header: &str, rel: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let uri = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;
        let matches = parts.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|value| value.trim_matches('"').split_whitespace().any(|r| r == rel))
                .unwrap_or(false)
        });
        matches.then(|| uri.to_string())
    })
}

fn page_number(uri: &str) -> Option<usize> {
    let parsed = reqwest::Url::parse(uri).ok()?;
    let page = parsed
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<usize>().ok());
    page
}
