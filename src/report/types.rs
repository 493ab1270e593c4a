use crate::stats::ChangeStats;

/// Number of files listed per author unless the full list is requested.
pub const TOP_FILES: usize = 5;

/// One author's line in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorSummary {
    /// GitHub login
    pub author: String,
    /// Pull requests counted for the author
    pub pull_requests: usize,
    /// Sum over all counted files
    pub total: ChangeStats,
    /// Mean (additions, deletions) per pull request
    pub average: (f64, f64),
    /// Files shown, most changed first
    pub files: Vec<(String, ChangeStats)>,
    /// Number of distinct files the author touched, shown or not
    pub files_changed: usize,
}

/// Ranked per-author report, most active author first.
#[derive(Debug)]
pub struct Report {
    pub authors: Vec<AuthorSummary>,
    /// Whether every file is listed instead of the top ones
    pub all_files: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_summary_creation() {
        let summary = AuthorSummary {
            author: "alice".to_string(),
            pull_requests: 2,
            total: ChangeStats::new(10, 4),
            average: (5.0, 2.0),
            files: vec![("src/lib.rs".to_string(), ChangeStats::new(10, 4))],
            files_changed: 1,
        };
        assert_eq!(summary.total.total(), 14);
        assert_eq!(summary.files.len(), summary.files_changed);
    }
}
