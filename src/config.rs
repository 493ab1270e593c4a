use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::github::DEFAULT_API_URL;

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = ".github-fame.toml";

/// Parallel requests per fetch phase when neither CLI nor config say otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .github-fame.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST endpoint, for GitHub Enterprise
    pub api_url: Option<String>,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsConfig {
    /// Globs excluded in addition to the defaults
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Parallel requests per fetch phase
    pub concurrency: Option<usize>,
}

impl Config {
    /// Load configuration from .github-fame.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: an explicit value (from the CLI) wins, then
    /// the config file, then the GITHUB_TOKEN env var.
    pub fn github_token(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.github.token.clone())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn concurrency(&self, explicit: Option<usize>) -> usize {
        explicit
            .or(self.stats.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1)
    }
}
