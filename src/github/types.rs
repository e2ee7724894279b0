//! Wire types for the three GitHub REST endpoints the report consumes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub login: String,
}

/// `GET /search/issues`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

/// One issue/PR hit from the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub html_url: String,
    /// API resource URL of the repository, e.g. `https://api.github.com/repos/owner/repo`.
    pub repository_url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_association: String,
    pub user: Option<SearchUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchUser {
    pub login: String,
}

/// `GET /repos/{owner}/{repo}`, reduced to the one field we read.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryResponse {
    pub stargazers_count: u64,
}
