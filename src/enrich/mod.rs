use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::github::types::RepositoryResponse;
use crate::github::{get_json, ApiError, GithubApi, Session};
use crate::pr::{FetchError, PullRequestRecord};

/// Memoizes one star-count lookup per repository.
///
/// The map lock only guards slot creation; the lookup itself runs inside the
/// slot's `OnceCell`, so concurrent callers for the same repository wait on a
/// single request while lookups for different repositories proceed in parallel.
#[derive(Default)]
pub struct StarCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<u64>>>>,
}

impl StarCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, repo: &str) -> Arc<OnceCell<u64>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(repo.to_string()).or_default())
    }

    /// Star count for `repo` (`owner/name`), fetched at most once per cache.
    /// A failed lookup leaves the slot empty.
    pub async fn star_count(&self, api: &dyn GithubApi, repo: &str) -> Result<u64, ApiError> {
        let slot = self.slot(repo).await;
        slot.get_or_try_init(|| fetch_star_count(api, repo))
            .await
            .copied()
    }
}

#[instrument(skip(api))]
async fn fetch_star_count(api: &dyn GithubApi, repo: &str) -> Result<u64, ApiError> {
    debug!("fetching star count");
    let info: RepositoryResponse = get_json(api, &format!("repos/{repo}"), &[]).await?;
    Ok(info.stargazers_count)
}

/// What enrichment resolved, and which lookups failed in lenient mode.
#[derive(Debug, Default)]
pub struct EnrichOutcome {
    pub resolved: usize,
    pub failures: Vec<FetchError>,
}

/// Attach star counts to every record.
///
/// One lookup is dispatched per distinct repository, bounded by the session's
/// concurrency. With `strict_stars` the first failure cancels the remaining
/// lookups and is returned; otherwise failures are collected and the affected
/// records keep `repo_star_count = None`.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn enrich(
    session: &Arc<Session>,
    records: &mut [PullRequestRecord],
) -> Result<EnrichOutcome, FetchError> {
    let strict = session.settings().strict_stars;
    let repos: Vec<String> = {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|record| seen.insert(record.repo_name.as_str()))
            .map(|record| record.repo_name.clone())
            .collect()
    };
    info!(repos = repos.len(), strict, "looking up star counts");

    let semaphore = Arc::new(Semaphore::new(session.settings().concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for repo in repos {
        let session = Arc::clone(session);
        let semaphore = Arc::clone(&semaphore);
        let span = info_span!("star_lookup", repo = %repo);
        tasks.spawn(
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| FetchError::Task("star semaphore closed".to_string()))?;
                let looked_up = session.stars().star_count(session.api(), &repo).await;
                match looked_up {
                    Ok(stars) => Ok((repo, stars)),
                    Err(source) => Err(FetchError::StarLookup { repo, source }),
                }
            }
            .instrument(span),
        );
    }

    let mut counts = HashMap::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|join_err| FetchError::Task(join_err.to_string()))
            .and_then(|inner| inner);
        match result {
            Ok((repo, stars)) => {
                counts.insert(repo, stars);
            }
            Err(err) if strict => {
                warn!(error = %err, remaining = tasks.len(), "star lookup failed, cancelling the rest");
                tasks.abort_all();
                return Err(err);
            }
            Err(err) => {
                warn!(error = %err, "star lookup failed, leaving count unresolved");
                failures.push(err);
            }
        }
    }

    for record in records.iter_mut() {
        record.repo_star_count = counts.get(&record.repo_name).copied();
    }

    Ok(EnrichOutcome {
        resolved: counts.len(),
        failures,
    })
}
