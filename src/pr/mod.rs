pub mod annotate;
pub mod diff;
pub mod types;

pub use annotate::DiffAnnotator;
pub use types::{AnnotatedPullRequest, PullRequest, RepoSlug};

use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

use crate::github::{
    GitHubError, PageExtractor, PaginatedCollector, RateLimitedFetcher, WorkerPool,
    JSON_MEDIA_TYPE,
};

/// GitHub's search API never returns more matches than this.
pub const SEARCH_RESULT_CEILING: u64 = 1000;

const PAGE_SIZE: usize = 100;

/// Login attributed to pull requests whose author account was deleted.
const GHOST_LOGIN: &str = "ghost";

/// Parse a repository given as `owner/name` or as a GitHub URL such as
/// `https://github.com/owner/name`.
pub fn parse_repository(input: &str) -> Result<RepoSlug, GitHubError> {
    let invalid = || GitHubError::InvalidRepository(input.to_string());
    let trimmed = input.trim();

    let path = if trimmed.contains("://") {
        let parsed = reqwest::Url::parse(trimmed).map_err(|_| invalid())?;
        if parsed.host_str() != Some("github.com") {
            return Err(invalid());
        }
        parsed.path().to_string()
    } else {
        trimmed.to_string()
    };

    let segments: Vec<_> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 2 {
        return Err(invalid());
    }

    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1]);
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(segments[0]) || !valid(name) {
        return Err(invalid());
    }

    Ok(RepoSlug {
        owner: segments[0].to_string(),
        name: name.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

fn login(user: Option<User>) -> String {
    user.map(|u| u.login).unwrap_or_else(|| GHOST_LOGIN.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    user: Option<User>,
    /// Only present when the issue is a pull request.
    pull_request: Option<SearchPullRef>,
}

#[derive(Debug, Deserialize)]
struct SearchPullRef {
    url: String,
    merged_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    number: u64,
    title: String,
    user: Option<User>,
    url: String,
    merged_at: Option<String>,
}

/// Reads `search/issues` pages, where merge state sits under `pull_request`.
pub struct SearchExtractor;

impl PageExtractor for SearchExtractor {
    type Item = PullRequest;

    fn extract(&self, body: &str) -> Result<Vec<PullRequest>, GitHubError> {
        let page: SearchPage = serde_json::from_str(body)?;
        Ok(page
            .items
            .into_iter()
            .filter_map(|item| {
                let pull = item.pull_request?;
                Some(PullRequest {
                    number: item.number,
                    merged: pull.merged_at.is_some(),
                    author: login(item.user),
                    title: item.title,
                    diff_url: pull.url,
                })
            })
            .collect())
    }
}

/// Reads `repos/{owner}/{repo}/pulls` pages, a bare array of pull requests.
pub struct ListingExtractor;

impl PageExtractor for ListingExtractor {
    type Item = PullRequest;

    fn extract(&self, body: &str) -> Result<Vec<PullRequest>, GitHubError> {
        let items: Vec<ListItem> = serde_json::from_str(body)?;
        Ok(items
            .into_iter()
            .map(|item| PullRequest {
                number: item.number,
                merged: item.merged_at.is_some(),
                author: login(item.user),
                title: item.title,
                diff_url: item.url,
            })
            .collect())
    }
}

/// Drops repeated PR numbers, keeping the first occurrence in place. A PR
/// opened while pages are being fetched shifts the page boundaries and makes
/// the last item of one page reappear on the next.
pub fn dedupe_by_number(pull_requests: Vec<PullRequest>) -> Vec<PullRequest> {
    let mut seen = HashSet::new();
    pull_requests
        .into_iter()
        .filter(|pr| seen.insert(pr.number))
        .collect()
}

/// Lists every pull request of a repository.
pub struct PullRequestLister {
    fetcher: RateLimitedFetcher,
    collector: PaginatedCollector,
    api_url: String,
}

impl PullRequestLister {
    pub fn new(fetcher: RateLimitedFetcher, pool: WorkerPool, api_url: &str) -> Self {
        Self {
            collector: PaginatedCollector::new(fetcher.clone(), pool),
            fetcher,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Uses the search API when filtering by author, the pulls listing otherwise.
    pub async fn list(
        &self,
        repo: &RepoSlug,
        author: Option<&str>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        match author {
            Some(author) => self.list_using_search(repo, Some(author)).await,
            None => self.list_using_pulls(repo).await,
        }
    }

    fn search_uri(&self, repo: &RepoSlug, author: Option<&str>, per_page: usize) -> String {
        let mut uri = format!(
            "{}/search/issues?per_page={}&q=is:pr+repo:{}",
            self.api_url, per_page, repo
        );
        if let Some(author) = author {
            uri.push_str("+author:");
            uri.push_str(author);
        }
        uri
    }

    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn list_using_search(
        &self,
        repo: &RepoSlug,
        author: Option<&str>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let first_match = self
            .fetcher
            .fetch(&self.search_uri(repo, author, 1), JSON_MEDIA_TYPE)
            .await?;
        let total_count = serde_json::from_str::<SearchPage>(&first_match.body)?.total_count;
        debug!(total_count, "search result count");
        if total_count > SEARCH_RESULT_CEILING {
            return Err(GitHubError::ResultLimitExceeded { count: total_count });
        }

        info!("Getting pull requests for {} using GitHub's search API", repo);
        let pull_requests = self
            .collector
            .collect_all(&self.search_uri(repo, author, PAGE_SIZE), SearchExtractor)
            .await?;
        Ok(dedupe_by_number(pull_requests))
    }

    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn list_using_pulls(&self, repo: &RepoSlug) -> Result<Vec<PullRequest>, GitHubError> {
        let uri = format!(
            "{}/repos/{}/pulls?state=all&per_page={}",
            self.api_url, repo, PAGE_SIZE
        );

        info!("Getting pull requests for {} using GitHub's pulls API", repo);
        let pull_requests = self.collector.collect_all(&uri, ListingExtractor).await?;
        Ok(dedupe_by_number(pull_requests))
    }
}

/// Outcome of narrowing the listed pull requests down to the ones analysed.
#[derive(Debug, Default)]
pub struct Selection {
    pub kept: Vec<PullRequest>,
    pub unmerged: Vec<PullRequest>,
    pub explicitly_excluded: Vec<PullRequest>,
}

/// Keeps merged pull requests (all of them with `include_unmerged`) whose
/// numbers are not in `excluded_numbers`.
pub fn retain_reviewable(
    pull_requests: Vec<PullRequest>,
    include_unmerged: bool,
    excluded_numbers: &HashSet<u64>,
) -> Selection {
    let mut selection = Selection::default();
    for pr in pull_requests {
        if !include_unmerged && !pr.merged {
            selection.unmerged.push(pr);
        } else if excluded_numbers.contains(&pr.number) {
            selection.explicitly_excluded.push(pr);
        } else {
            selection.kept.push(pr);
        }
    }
    selection
}
