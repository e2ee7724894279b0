use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::github::types::SearchItem;
use crate::github::WEB_URL;

/// `owner/name` pair extracted from a repository identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse a repository identifier as reported by the search API.
    ///
    /// Accepts the full API URL (`https://api.github.com/repos/owner/repo`),
    /// the bare resource path (`repos/owner/repo`) or `owner/repo`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let parsed = Url::parse(identifier).ok();
        let path = parsed.as_ref().map_or(identifier, |url| url.path());
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (owner, name) = match segments.iter().position(|s| *s == "repos") {
            Some(idx) => (segments.get(idx + 1)?, segments.get(idx + 2)?),
            None if segments.len() == 2 && parsed.is_none() => (&segments[0], &segments[1]),
            None => return None,
        };

        Some(Self {
            owner: (*owner).to_string(),
            name: (*name).to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn web_url(&self) -> String {
        format!("{}/{}/{}", WEB_URL, self.owner, self.name)
    }

    /// GitHub logins are case-insensitive.
    pub fn is_owned_by(&self, login: &str) -> bool {
        self.owner.eq_ignore_ascii_case(login)
    }
}

/// A merged pull request as carried through the pipeline.
#[derive(Debug, Clone)]
pub struct PullRequestRecord {
    /// Web link to the PR
    pub url: String,
    /// Raw repository identifier from the API
    pub repo_api_identifier: String,
    /// `owner/repo`, derived from the identifier
    pub repo_name: String,
    /// Web link to the repository, derived from the identifier
    pub repo_web_url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub author_association: String,
    /// True when the acting user owns the repository
    pub belongs_to_self: bool,
    /// Filled in by star enrichment; `None` until resolved
    pub repo_star_count: Option<u64>,
}

impl PullRequestRecord {
    /// Convert a search hit, deriving repository fields from its identifier.
    /// Returns `None` when the identifier does not name a repository.
    pub fn from_search_item(item: SearchItem, username: &str) -> Option<Self> {
        let repo = RepoRef::from_identifier(&item.repository_url)?;
        Some(Self {
            url: item.html_url,
            repo_name: repo.full_name(),
            repo_web_url: repo.web_url(),
            belongs_to_self: repo.is_owned_by(username),
            repo_api_identifier: item.repository_url,
            title: item.title,
            created_at: item.created_at,
            author_association: item.author_association,
            repo_star_count: None,
        })
    }
}
