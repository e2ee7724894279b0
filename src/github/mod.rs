pub mod session;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use session::Session;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const WEB_URL: &str = "https://github.com";

const USER_AGENT: &str = concat!("contrib-report/", env!("CARGO_PKG_VERSION"));

/// Longest server-requested wait sat out before giving up on a request.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("GitHub token not provided (use --token, the config file, or GITHUB_TOKEN)")]
    MissingToken,

    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Failed to decode GitHub response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid GitHub API URL: {0}")]
    InvalidUrl(String),
}

/// The single capability the pipeline needs from the hosting platform:
/// an authenticated GET that returns the raw response body.
///
/// Implementations must be Send + Sync so one handle can be shared by every
/// concurrent page fetch and star lookup.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ApiError>;
}

/// GET `path` and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    api: &dyn GithubApi,
    path: &str,
    query: &[(&str, String)],
) -> Result<T, ApiError> {
    let body = api.get(path, query).await?;
    serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the REST API.
    pub api_url: String,
    /// Per-request timeout, covering connect through body read.
    pub timeout: Duration,
    /// Retries for transient failures (connect/timeout errors, 5xx, 429).
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt.
    pub retry_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// reqwest-backed [`GithubApi`].
pub struct GithubClient {
    client: reqwest::Client,
    base: Url,
    token: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl GithubClient {
    /// Build a client. An empty token is accepted here and rejected by the
    /// first request, before anything goes over the wire.
    pub fn new(token: impl Into<String>, options: &ClientOptions) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()?;

        let mut base = Url::parse(&options.api_url)
            .map_err(|_| ApiError::InvalidUrl(options.api_url.clone()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            token: token.into(),
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
        })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim)
}

/// How long GitHub asked us to wait, if it asked at all.
///
/// `Retry-After` (secondary rate limit) wins. Otherwise an exhausted primary
/// limit (`X-RateLimit-Remaining: 0`) waits until `X-RateLimit-Reset`.
fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    if header_str(headers, "x-ratelimit-remaining") != Some("0") {
        return None;
    }
    let reset = header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<u64>().ok())?;
    let reset_at = UNIX_EPOCH + Duration::from_secs(reset);
    Some(reset_at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

#[async_trait]
impl GithubApi for GithubClient {
    #[instrument(level = "debug", skip(self, query))]
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ApiError> {
        if self.token.is_empty() {
            return Err(ApiError::MissingToken);
        }

        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|_| ApiError::InvalidUrl(path.to_string()))?;

        let mut attempt = 0u32;
        loop {
            let sent = self
                .client
                .get(url.clone())
                .query(query)
                .header(AUTHORIZATION, format!("token {}", self.token))
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await;

            let requested_wait = match sent {
                Ok(response) if response.status().is_success() => {
                    let body = response.bytes().await?;
                    debug!(bytes = body.len(), attempt, "received response");
                    return Ok(body.to_vec());
                }
                Ok(response) => {
                    let status = response.status();
                    let wait = rate_limit_wait(response.headers());
                    let retryable = is_transient_status(status)
                        || (status == StatusCode::FORBIDDEN && wait.is_some());
                    let too_long = wait.is_some_and(|wait| wait > MAX_RATE_LIMIT_WAIT);
                    if !retryable || too_long || attempt >= self.max_retries {
                        if retryable && too_long {
                            warn!(%status, wait_secs = wait.map_or(0, |w| w.as_secs()), "rate limit reset is too far away");
                        }
                        return Err(ApiError::Status {
                            status: status.as_u16(),
                            path: path.to_string(),
                        });
                    }
                    warn!(%status, attempt = attempt + 1, "transient GitHub API status");
                    wait
                }
                Err(err) if (err.is_timeout() || err.is_connect()) && attempt < self.max_retries => {
                    warn!(error = %err, attempt = attempt + 1, "transient GitHub API transport error");
                    None
                }
                Err(err) => return Err(err.into()),
            };

            let delay = requested_wait
                .unwrap_or_else(|| self.retry_backoff * 2u32.saturating_pow(attempt));
            debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
