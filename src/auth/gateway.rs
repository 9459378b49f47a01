use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::lifecycle::SessionLifecycle;
use super::refresh::{RefreshCoordinator, RefreshError};
use super::store::TokenStore;
use crate::middleware::{Middleware, Next};
use crate::{Error, Request, Response, Result};

/// Attaches the stored access token to every request and recovers from a `401`
/// by refreshing once and replaying the request once.
///
/// A request is never replayed more than once. When recovery is impossible the
/// caller gets [`Error::SessionExpired`] and the session lifecycle is notified.
#[derive(Debug, Clone)]
pub struct RequestGateway {
    coordinator: RefreshCoordinator,
    lifecycle: Arc<SessionLifecycle>,
    anonymous_paths: Vec<String>,
    preemptive_skew: Option<u64>,
}

impl RequestGateway {
    pub fn new(coordinator: RefreshCoordinator, lifecycle: Arc<SessionLifecycle>) -> Self {
        Self {
            coordinator,
            lifecycle,
            anonymous_paths: Vec::new(),
            preemptive_skew: None,
        }
    }

    /// Requests to `path` go out without credentials and are never refreshed.
    /// `path` is matched against the path actually sent, base url prefix included.
    pub fn anonymous_path(mut self, path: impl Into<String>) -> Self {
        self.anonymous_paths.push(path.into());
        self
    }

    /// Refresh before sending when the access token expires within `skew`,
    /// rounded up to whole seconds.
    pub fn preemptive_refresh(mut self, skew: Option<Duration>) -> Self {
        self.preemptive_skew = skew.map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0));
        self
    }

    fn store(&self) -> &TokenStore {
        self.coordinator.store()
    }

    fn is_anonymous(&self, request: &Request) -> bool {
        self.anonymous_paths.iter().any(|p| p == request.path())
    }

    /// A fresh access token for the session that was current at `generation`.
    async fn refreshed_token(&self, generation: u64) -> Result<String> {
        match self.coordinator.refresh().await {
            Ok(pair) => Ok(pair.access_token),
            // the user logged in or out meanwhile; that session is not ours to end
            Err(RefreshError::Superseded) => Err(Error::SessionExpired),
            Err(e) => {
                info!(error = %e, "credentials could not be refreshed");
                Err(self.expire(generation))
            }
        }
    }

    fn expire(&self, generation: u64) -> Error {
        self.lifecycle.session_expired_during(generation);
        Error::SessionExpired
    }
}

#[async_trait]
impl Middleware for RequestGateway {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if self.is_anonymous(&request) {
            return next.run(request).await;
        }
        let generation = self.store().generation();
        let Some(pair) = self.store().get() else {
            let url = request.uri().clone();
            let res = next.run(request).await?;
            if res.is_unauthorized() {
                debug!(%url, "401 with no stored credentials");
                return Err(Error::Unauthenticated);
            }
            return Ok(res);
        };

        let mut token = pair.access_token;
        let mut recovered = false;
        if let Some(skew) = self.preemptive_skew {
            if TokenStore::is_expired(&token, skew) {
                debug!(skew, "access token about to expire; refreshing before sending");
                token = self.refreshed_token(generation).await?;
                recovered = true;
            }
        }

        let res = next.run(request.clone().set_bearer(&token)?).await?;
        if !res.is_unauthorized() {
            return Ok(res);
        }
        if recovered {
            warn!(url = %request.uri(), "401 with freshly refreshed credentials");
            return Err(self.expire(generation));
        }

        let retry_token = match self.store().access_token() {
            // someone else already rotated the pair while this request was in flight
            Some(current) if current != token => {
                debug!(url = %request.uri(), "401 with superseded token; replaying with the current one");
                current
            }
            _ => {
                debug!(url = %request.uri(), "401; refreshing credentials");
                self.refreshed_token(generation).await?
            }
        };

        let res = next.run(request.clone().set_bearer(&retry_token)?).await?;
        if res.is_unauthorized() {
            warn!(url = %request.uri(), "401 after refresh; session is no longer valid");
            return Err(self.expire(generation));
        }
        Ok(res)
    }
}
