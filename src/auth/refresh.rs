//! Single-flight credential refresh.
//!
//! However many requests discover an expired session at once, one refresh exchange
//! runs. Callers that arrive while it is outstanding join a FIFO queue and all
//! receive its outcome when it settles.
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode, Uri};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::credentials::{CredentialPair, RefreshRequest, RefreshResponse, TokenType};
use super::store::TokenStore;
use crate::transport::Transport;
use crate::{InMemoryBody, Request};

/// Why a refresh attempt failed. Cloned to every caller waiting on the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Nothing to exchange: the store holds no credential pair.
    MissingRefreshToken,
    /// The refresh endpoint answered with a non-success status.
    Rejected(StatusCode),
    InvalidResponse(String),
    Transport(String),
    TimedOut(Duration),
    /// The new pair could not be persisted.
    Storage(String),
    /// The exchange panicked or its task was torn down before settling.
    Abandoned,
    /// A login, logout or expiry happened while the exchange ran. Its result
    /// was discarded and the store left as the new session set it.
    Superseded,
}

impl Display for RefreshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::MissingRefreshToken => write!(f, "no refresh token stored"),
            RefreshError::Rejected(status) => write!(f, "refresh rejected with status {}", status),
            RefreshError::InvalidResponse(e) => write!(f, "refresh response unreadable: {}", e),
            RefreshError::Transport(e) => write!(f, "refresh request failed: {}", e),
            RefreshError::TimedOut(d) => write!(f, "refresh did not settle within {:?}", d),
            RefreshError::Storage(e) => write!(f, "could not store refreshed credentials: {}", e),
            RefreshError::Abandoned => write!(f, "refresh abandoned before settling"),
            RefreshError::Superseded => write!(f, "session changed while refreshing"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Exchanges a refresh token for a new credential pair.
#[async_trait]
pub trait RefreshExchange: Send + Sync + Debug {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, RefreshError>;
}

/// `POST <endpoint>` with `{"refresh_token": ...}`.
///
/// Talks to the transport directly: the refresh call must not pass back through
/// the gateway that triggered it.
#[derive(Debug)]
pub struct HttpRefreshExchange {
    transport: Arc<dyn Transport>,
    endpoint: Uri,
}

impl HttpRefreshExchange {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Uri) -> Self {
        Self { transport, endpoint }
    }

    fn build_request(&self, refresh_token: &str) -> Result<Request, RefreshError> {
        let body = InMemoryBody::new_json(RefreshRequest { refresh_token })
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        Ok(Request::new(Method::POST, self.endpoint.clone())
            .set_header(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"))
            .set_header(ACCEPT, HeaderValue::from_static("application/json"))
            .set_body(body))
    }
}

#[async_trait]
impl RefreshExchange for HttpRefreshExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, RefreshError> {
        let request = self.build_request(refresh_token)?;
        let res = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status));
        }
        let data: RefreshResponse = res.json().map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        if let Some(TokenType::Other(kind)) = &data.token_type {
            warn!(token_type = %kind, "refresh returned a non-bearer token type; sending it as Bearer");
        }
        Ok(data.into_pair(refresh_token))
    }
}

type Outcome = Result<CredentialPair, RefreshError>;

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing { waiters: VecDeque<oneshot::Sender<Outcome>> },
}

#[derive(Debug)]
struct Shared {
    store: TokenStore,
    exchange: Arc<dyn RefreshExchange>,
    timeout: Duration,
    state: Mutex<RefreshState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the refresh state of one session. Clones share that state.
///
/// The exchange runs on its own task: a caller that stops waiting does not cancel
/// it, and its result is simply dropped for that caller.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(store: TokenStore, exchange: Arc<dyn RefreshExchange>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                exchange,
                timeout: Duration::from_secs(15),
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Set the upper bound for one exchange. Must be called before the coordinator
    /// is cloned or used.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.timeout = timeout,
            None => warn!("refresh timeout changed after the coordinator was shared; ignoring"),
        }
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.shared.store
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.shared.state(), RefreshState::Refreshing { .. })
    }

    /// Callers waiting on the outstanding refresh.
    pub fn pending(&self) -> usize {
        match &*self.shared.state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Obtain a fresh credential pair, joining the outstanding refresh if there is one.
    ///
    /// On success the store already holds the returned pair. On failure the store
    /// has been cleared, unless the session changed in the meantime
    /// ([`RefreshError::Superseded`]), in which case it is left alone.
    pub async fn refresh(&self) -> Result<CredentialPair, RefreshError> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.shared.state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push_back(tx);
                    debug!(position = waiters.len(), "joined in-flight refresh");
                    None
                }
                RefreshState::Idle => {
                    let generation = self.shared.store.generation();
                    let Some(pair) = self.shared.store.get() else {
                        return Err(RefreshError::MissingRefreshToken);
                    };
                    *state = RefreshState::Refreshing { waiters: VecDeque::from([tx]) };
                    Some((pair.refresh_token, generation))
                }
            }
        };
        if let Some((refresh_token, generation)) = start {
            tokio::spawn(self.clone().settle(refresh_token, generation));
        }
        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    async fn settle(self, refresh_token: String, generation: u64) {
        let timeout = self.shared.timeout;
        let exchange = AssertUnwindSafe(self.shared.exchange.exchange(&refresh_token)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RefreshError::Abandoned),
            Err(_) => Err(RefreshError::TimedOut(timeout)),
        };
        let store = &self.shared.store;
        let outcome = outcome.and_then(|pair| match store.set_if_current(&pair, generation) {
            Ok(true) => Ok(pair),
            Ok(false) => Err(RefreshError::Superseded),
            Err(e) => Err(RefreshError::Storage(e.to_string())),
        });
        match &outcome {
            Ok(_) => info!("credentials refreshed"),
            Err(RefreshError::Superseded) => info!("session changed during refresh; discarding refreshed credentials"),
            Err(e) => match store.clear_if_current(generation) {
                Ok(true) => warn!(error = %e, "credential refresh failed; cleared stored credentials"),
                Ok(false) => info!(error = %e, "credential refresh failed after the session changed"),
                Err(clear_err) => warn!(error = %e, %clear_err, "credential refresh failed; could not clear token storage"),
            },
        }
        let waiters = match std::mem::take(&mut *self.shared.state()) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        };
        debug!(waiters = waiters.len(), "releasing refresh waiters");
        for waiter in waiters {
            // receiver gone: that caller was torn down, discard
            let _ = waiter.send(outcome.clone());
        }
    }
}
