use std::fmt;

/// A pull request as listed by the GitHub API, before its diff is known.
/// Both listing strategies normalise their payloads into this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// Whether the PR was merged
    pub merged: bool,
    /// Author's GitHub login
    pub author: String,
    /// PR title
    pub title: String,
    /// API URL that serves the PR diff under the diff media type
    pub diff_url: String,
}

/// A pull request together with the per-file changes of its diff.
#[derive(Debug, Clone)]
pub struct AnnotatedPullRequest {
    pub pull_request: PullRequest,
    /// Files in diff order
    pub changes: Vec<FileChange>,
}

/// Line counts for a single file within a PR diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// File path after the change (e.g., "src/auth/config.rs"); the old path
    /// for deletions
    pub path: String,
    /// Lines added in this file
    pub additions: u64,
    /// Lines deleted in this file
    pub deletions: u64,
}

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_slug_display() {
        let slug = RepoSlug {
            owner: "org".to_string(),
            name: "repo".to_string(),
        };
        assert_eq!(slug.to_string(), "org/repo");
    }
}
