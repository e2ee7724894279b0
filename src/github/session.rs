use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::types::UserResponse;
use super::{get_json, ApiError, GithubApi};
use crate::config::FetchConfig;
use crate::enrich::StarCache;
use crate::pr::AuthError;

/// Per-invocation session state shared by every pipeline stage.
///
/// Holds the API handle, the fetch settings, the acting username (resolved
/// lazily, at most once) and the star-count cache.
pub struct Session {
    api: Arc<dyn GithubApi>,
    settings: FetchConfig,
    username: OnceCell<String>,
    stars: StarCache,
}

impl Session {
    pub fn new(api: Arc<dyn GithubApi>, settings: FetchConfig) -> Self {
        Self {
            api,
            settings,
            username: OnceCell::new(),
            stars: StarCache::new(),
        }
    }

    pub fn api(&self) -> &dyn GithubApi {
        self.api.as_ref()
    }

    pub fn settings(&self) -> &FetchConfig {
        &self.settings
    }

    pub fn stars(&self) -> &StarCache {
        &self.stars
    }

    /// Resolve the login of the authenticated user.
    ///
    /// Concurrent callers share one in-flight lookup; after it succeeds the
    /// cached value is returned without touching the network. A failed
    /// lookup is not cached.
    #[instrument(skip(self))]
    pub async fn resolve_username(&self) -> Result<&str, AuthError> {
        let login = self
            .username
            .get_or_try_init(|| async {
                debug!("resolving authenticated user");
                let user: UserResponse = get_json(self.api(), "user", &[])
                    .await
                    .map_err(|err| match err {
                        ApiError::MissingToken => AuthError::MissingToken,
                        other => AuthError::Identity(other),
                    })?;
                if user.login.is_empty() {
                    return Err(AuthError::EmptyLogin);
                }
                info!(login = %user.login, "logged in to GitHub");
                Ok(user.login)
            })
            .await?;
        Ok(login.as_str())
    }
}
