use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::github::{ClientOptions, DEFAULT_API_URL};

pub const DEFAULT_CONFIG_PATH: &str = ".contrib-report.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .contrib-report.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub-specific settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Concurrency, paging and retry settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Substrings (or exact `owner/repo` names) whose PRs are left out of the report
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Personal projects appended after the contributions
    #[serde(default, rename = "side_project")]
    pub side_projects: Vec<SideProject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API base URL, for GitHub Enterprise
    pub api_url: Option<String>,
}

/// How many search pages to request for a given hit count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingMode {
    /// Every reachable page
    #[default]
    Exact,
    /// Only pages where `page * page_size < total`
    Legacy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: u32,
    /// Maximum in-flight requests per fan-out stage
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub paging: PagingMode,
    /// Abort on the first failed star lookup instead of rendering it unresolved
    pub strict_stars: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            concurrency: 4,
            timeout_secs: 30,
            max_retries: 3,
            paging: PagingMode::Exact,
            strict_stars: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SideProject {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "introduction")]
    pub description: String,
}

impl Config {
    /// Load configuration from `path`, or from .contrib-report.toml in the
    /// current directory when no path is given. A missing default file yields
    /// the default config; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from(default_path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var. Blank values count as unset.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    /// Ignore entries, trimmed and lower-cased, blanks dropped.
    pub fn ignore_list(&self) -> Vec<String> {
        self.ignore
            .iter()
            .map(|entry| entry.trim().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect()
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_url: self
                .github
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(self.fetch.timeout_secs.max(1)),
            max_retries: self.fetch.max_retries,
            ..ClientOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.ignore.is_empty());
        assert!(config.side_projects.is_empty());
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.paging, PagingMode::Exact);
        assert!(config.fetch.strict_stars);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
ignore = ["Gizmo", "  acme/legacy ", ""]

[github]
token = "abc"
api_url = "https://ghe.example.com/api/v3"

[fetch]
concurrency = 8
paging = "legacy"
strict_stars = false

[[side_project]]
name = "tool"
url = "https://github.com/octo/tool"
introduction = "A handy tool"

[[side_project]]
name = "lib"
url = "https://github.com/octo/lib"
description = "A library"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github_token().as_deref(), Some("abc"));
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.paging, PagingMode::Legacy);
        assert!(!config.fetch.strict_stars);
        assert_eq!(config.ignore_list(), vec!["gizmo", "acme/legacy"]);
        assert_eq!(config.side_projects.len(), 2);
        assert_eq!(config.side_projects[0].description, "A handy tool");
        assert_eq!(config.side_projects[1].description, "A library");
        assert_eq!(config.client_options().api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_rejects_unknown_paging_mode() {
        let result: Result<Config, _> = toml::from_str("[fetch]\npaging = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("contrib_report_test_config.toml");
        std::fs::write(&path, "ignore = [\"spam\"]\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.ignore_list(), vec!["spam"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let path = std::env::temp_dir().join("contrib_report_does_not_exist.toml");
        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::FileRead(_))));
    }
}
