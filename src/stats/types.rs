use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Added and deleted line counts.
///
/// Ordered by total lines touched, then by additions; two values compare
/// equal only when both counts are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeStats {
    pub additions: u64,
    pub deletions: u64,
}

impl ChangeStats {
    pub fn new(additions: u64, deletions: u64) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    pub fn total(&self) -> u64 {
        self.additions + self.deletions
    }

    fn ordering_key(&self) -> (u64, u64) {
        (self.total(), self.additions)
    }
}

impl Ord for ChangeStats {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

impl PartialOrd for ChangeStats {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for ChangeStats {
    type Output = ChangeStats;

    fn add(self, other: Self) -> Self {
        Self {
            additions: self.additions + other.additions,
            deletions: self.deletions + other.deletions,
        }
    }
}

impl AddAssign for ChangeStats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for ChangeStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ChangeStats::default(), Add::add)
    }
}

impl fmt::Display for ChangeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(+{}, -{})", self.additions, self.deletions)
    }
}

/// Everything one author contributed across the analysed pull requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStatistics {
    /// Pull requests counted for this author, including ones whose files were
    /// all excluded
    pub pull_requests: usize,
    /// Accumulated changes per file path
    pub files: HashMap<String, ChangeStats>,
}

impl UserStatistics {
    pub fn total_changes(&self) -> ChangeStats {
        self.files.values().copied().sum()
    }

    /// Key authors are ranked by: total changes, then pull request count.
    pub fn ranking_key(&self) -> (ChangeStats, usize) {
        (self.total_changes(), self.pull_requests)
    }

    /// Mean additions and deletions per pull request.
    pub fn average_per_pull_request(&self) -> (f64, f64) {
        if self.pull_requests == 0 {
            return (0.0, 0.0);
        }
        let total = self.total_changes();
        let count = self.pull_requests as f64;
        (total.additions as f64 / count, total.deletions as f64 / count)
    }

    /// Files from most to least changed; equal changes fall back to path order.
    pub fn ranked_files(&self) -> Vec<(String, ChangeStats)> {
        let mut files: Vec<(String, ChangeStats)> = self
            .files
            .iter()
            .map(|(path, stats)| (path.clone(), *stats))
            .collect();
        files.sort_by(|(path_a, a), (path_b, b)| b.cmp(a).then_with(|| path_a.cmp(path_b)));
        files
    }
}
