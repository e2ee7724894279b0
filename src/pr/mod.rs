pub mod types;

pub use types::PullRequestRecord;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, instrument, trace, warn, Instrument};

use crate::config::PagingMode;
use crate::github::types::SearchResponse;
use crate::github::{get_json, ApiError, Session};

/// Largest `per_page` the search endpoint honours.
pub const MAX_PAGE_SIZE: u32 = 100;

/// The search endpoint never serves hits beyond this offset.
pub const MAX_SEARCH_RESULTS: u64 = 1000;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("GitHub token not provided (use --token, the config file, or GITHUB_TOKEN)")]
    MissingToken,

    #[error("Failed to resolve the authenticated GitHub user: {0}")]
    Identity(#[source] ApiError),

    #[error("GitHub returned an empty login for the authenticated user")]
    EmptyLogin,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to probe merged PR count: {0}")]
    Probe(#[source] ApiError),

    #[error("Failed to fetch search page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: ApiError,
    },

    #[error("Failed to look up star count for {repo}: {source}")]
    StarLookup {
        repo: String,
        #[source]
        source: ApiError,
    },

    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Number of search pages to request for `total` hits.
///
/// `Exact` covers every reachable hit. `Legacy` keeps issuing pages only
/// while `page * page_size < total`, which drops the final page and
/// returns nothing at all when `total <= page_size`.
pub fn page_count(total: u64, page_size: u32, mode: PagingMode) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = match mode {
        PagingMode::Exact => total.min(MAX_SEARCH_RESULTS).div_ceil(page_size),
        PagingMode::Legacy => total.saturating_sub(1) / page_size,
    };
    let max_pages = MAX_SEARCH_RESULTS.div_ceil(page_size);
    u32::try_from(pages.min(max_pages)).unwrap_or(u32::MAX)
}

fn search_query(username: &str, page: u32, per_page: u32) -> [(&'static str, String); 5] {
    [
        ("q", format!("author:{username} type:pr is:merged")),
        ("sort", "created".to_string()),
        ("order", "desc".to_string()),
        ("per_page", per_page.to_string()),
        ("page", page.to_string()),
    ]
}

/// Ask for a single hit to learn how many merged PRs the user has.
#[instrument(skip(session))]
pub async fn probe_total_count(session: &Session) -> Result<u64, FetchError> {
    let username = session.resolve_username().await?;
    let query = search_query(username, 1, 1);
    let response: SearchResponse = get_json(session.api(), "search/issues", &query)
        .await
        .map_err(FetchError::Probe)?;
    debug!(total = response.total_count, "probe complete");
    Ok(response.total_count)
}

/// Fetch one page of merged PRs, dropping those against the user's own
/// repositories.
#[instrument(skip(session))]
pub async fn fetch_page(
    session: &Session,
    page: u32,
    page_size: u32,
) -> Result<Vec<PullRequestRecord>, FetchError> {
    let username = session.resolve_username().await?;
    let query = search_query(username, page, page_size);
    let response: SearchResponse = get_json(session.api(), "search/issues", &query)
        .await
        .map_err(|source| FetchError::Page { page, source })?;

    let mut items = response.items;
    let hits = items.len();
    // A page contributes at most `page_size` records; the merge channel in
    // `fetch_all` is sized on that.
    if hits > page_size as usize {
        warn!(hits, page_size, "search page longer than requested, truncating");
        items.truncate(page_size as usize);
    }

    let records: Vec<PullRequestRecord> = items
        .into_iter()
        .filter_map(|item| {
            let identifier = item.repository_url.clone();
            let author = item.user.as_ref().map_or("", |user| user.login.as_str()).to_string();
            let record = PullRequestRecord::from_search_item(item, username);
            match &record {
                Some(record) => trace!(
                    url = %record.url,
                    repo = %record.repo_api_identifier,
                    author = %author,
                    association = %record.author_association,
                    own = record.belongs_to_self,
                    "search hit"
                ),
                None => warn!(identifier = %identifier, "skipping PR with unrecognised repository identifier"),
            }
            record
        })
        .filter(|record| !record.belongs_to_self)
        .collect();

    debug!(hits, kept = records.len(), "page fetched");
    Ok(records)
}

/// Probe the hit count, fetch every page concurrently and merge the results.
///
/// At most `concurrency` pages are in flight. The first failing page aborts
/// the rest and is returned. Result order is unspecified.
#[instrument(skip(session))]
pub async fn fetch_all(session: Arc<Session>) -> Result<Vec<PullRequestRecord>, FetchError> {
    let settings = session.settings();
    let page_size = settings.page_size.clamp(1, MAX_PAGE_SIZE);
    let concurrency = settings.concurrency.max(1);

    let total = probe_total_count(&session).await?;
    let pages = page_count(total, page_size, settings.paging);
    if total > MAX_SEARCH_RESULTS {
        warn!(total, limit = MAX_SEARCH_RESULTS, "search results beyond the API limit are not reachable");
    }
    info!(total, pages, page_size, concurrency, "fetching merged PRs");
    if pages == 0 {
        return Ok(Vec::new());
    }

    // Sized for every record the pages can hold, so producers never block
    // on a receiver that is only drained after they finish.
    let (tx, mut rx) = mpsc::channel(pages as usize * page_size as usize);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for page in 1..=pages {
        let session = Arc::clone(&session);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tasks.spawn(
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| FetchError::Task("page semaphore closed".to_string()))?;
                let records = fetch_page(&session, page, page_size).await?;
                let kept = records.len();
                for record in records {
                    tx.send(record)
                        .await
                        .map_err(|_| FetchError::Task("page channel closed".to_string()))?;
                }
                Ok::<_, FetchError>((page, kept))
            }
            .instrument(info_span!("page_task", page)),
        );
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((page, kept))) => debug!(page, kept, "page merged"),
            Ok(Err(err)) => {
                warn!(error = %err, remaining = tasks.len(), "page fetch failed, cancelling the rest");
                tasks.abort_all();
                return Err(err);
            }
            Err(join_err) => {
                tasks.abort_all();
                return Err(FetchError::Task(join_err.to_string()));
            }
        }
    }

    // Every producer has finished, so the channel holds all records.
    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    info!(records = records.len(), "merged PRs fetched");
    Ok(records)
}
