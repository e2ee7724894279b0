//! In-process [`GithubApi`] used by the pipeline tests.
//!
//! Serves `/user`, `/search/issues` and `/repos/{owner}/{repo}` from memory,
//! counts every call, tracks how many calls overlap, and can inject failures,
//! latency and oversized search pages.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ApiError, GithubApi};

pub struct FakeGithub {
    login: Option<String>,
    identity_fails: bool,
    items: Vec<Value>,
    total_override: Option<u64>,
    stars: HashMap<String, u64>,
    failing_pages: HashSet<u32>,
    failing_repos: HashSet<String>,
    oversized_pages: bool,
    latency: Duration,
    calls: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Holds one in-flight slot; released on drop so aborted calls are counted out.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Build one search hit for `repo` (`owner/name`).
pub fn search_item(repo: &str, title: &str, created_at: &str) -> Value {
    json!({
        "html_url": format!("https://github.com/{repo}/pull/{}", title.len()),
        "repository_url": format!("https://api.github.com/repos/{repo}"),
        "title": title,
        "created_at": created_at,
        "author_association": "CONTRIBUTOR",
        "user": {"login": "octo"}
    })
}

impl FakeGithub {
    pub fn new(login: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            identity_fails: false,
            items: Vec::new(),
            total_override: None,
            stars: HashMap::new(),
            failing_pages: HashSet::new(),
            failing_repos: HashSet::new(),
            oversized_pages: false,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn without_credential() -> Self {
        Self {
            login: None,
            ..Self::new("")
        }
    }

    pub fn fail_identity(mut self) -> Self {
        self.identity_fails = true;
        self
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }

    /// Report `total` as the search hit count regardless of the items held.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total_override = Some(total);
        self
    }

    pub fn with_stars(mut self, repo: &str, stars: u64) -> Self {
        self.stars.insert(repo.to_string(), stars);
        self
    }

    pub fn fail_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn fail_repo(mut self, repo: &str) -> Self {
        self.failing_repos.insert(repo.to_string());
        self
    }

    /// Serve one item more than `per_page` on every search page.
    pub fn with_oversized_pages(mut self) -> Self {
        self.oversized_pages = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == path).count()
    }

    /// Calls that ran to completion (successfully or not), in the same
    /// format as [`FakeGithub::calls`].
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Pages requested from the search endpoint, excluding the one-item probe.
    pub fn pages_requested(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .calls()
            .iter()
            .filter_map(|c| c.strip_prefix("search/issues?page="))
            .filter_map(|rest| rest.split_once("&per_page="))
            .filter(|(_, per_page)| *per_page != "1")
            .filter_map(|(page, _)| page.parse().ok())
            .collect();
        pages.sort_unstable();
        pages
    }

    fn search(&self, page: u32, per_page: u32) -> Result<Vec<u8>, ApiError> {
        if self.failing_pages.contains(&page) {
            return Err(ApiError::Status {
                status: 502,
                path: format!("search/issues?page={page}"),
            });
        }
        let per_page = per_page.max(1) as usize;
        let start = (page.max(1) as usize - 1) * per_page;
        let served = if self.oversized_pages { per_page + 1 } else { per_page };
        let items: Vec<Value> = self.items.iter().skip(start).take(served).cloned().collect();
        let total = self.total_override.unwrap_or(self.items.len() as u64);
        Ok(serde_json::to_vec(&json!({"total_count": total, "items": items})).unwrap())
    }
}

fn query_value(query: &[(&str, String)], key: &str) -> u32 {
    query
        .iter()
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ApiError> {
        if self.login.is_none() {
            return Err(ApiError::MissingToken);
        }

        let call = if path == "search/issues" {
            let page = query_value(query, "page");
            let per_page = query_value(query, "per_page");
            format!("{path}?page={page}&per_page={per_page}")
        } else {
            path.to_string()
        };
        self.calls.lock().unwrap().push(call.clone());

        {
            let _slot = InFlight::enter(&self.in_flight, &self.peak_in_flight);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
        }

        let response = self.respond(path, query);
        self.completed.lock().unwrap().push(call);
        response
    }
}

impl FakeGithub {
    fn respond(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ApiError> {
        if path == "search/issues" {
            return self.search(query_value(query, "page"), query_value(query, "per_page"));
        }

        if path == "user" {
            if self.identity_fails {
                return Err(ApiError::Status {
                    status: 401,
                    path: path.to_string(),
                });
            }
            return Ok(serde_json::to_vec(&json!({"login": self.login})).unwrap());
        }

        if let Some(repo) = path.strip_prefix("repos/") {
            if self.failing_repos.contains(repo) {
                return Err(ApiError::Status {
                    status: 500,
                    path: path.to_string(),
                });
            }
            return match self.stars.get(repo) {
                Some(stars) => Ok(serde_json::to_vec(&json!({"stargazers_count": stars})).unwrap()),
                None => Err(ApiError::Status {
                    status: 404,
                    path: path.to_string(),
                }),
            };
        }

        Err(ApiError::Status {
            status: 404,
            path: path.to_string(),
        })
    }
}
