//! Token lifecycle for an authenticated client.
//!
//! ```text
//! Client::send -> RequestGateway -> Transport
//!                     | 401
//!                     v
//!             RefreshCoordinator -> RefreshExchange (POST /auth/refresh)
//!                     |
//!                 TokenStore  <-  SessionLifecycle (login, logout, expiry)
//! ```
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::transport::HyperTransport;
use crate::{Client, Result};

pub use claims::{Claims, ClaimsError};
pub use credentials::{CredentialPair, RefreshResponse, TokenType};
pub use gateway::RequestGateway;
pub use lifecycle::SessionLifecycle;
pub use refresh::{HttpRefreshExchange, RefreshCoordinator, RefreshError, RefreshExchange};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::TokenStore;

mod claims;
mod credentials;
mod gateway;
mod lifecycle;
mod refresh;
mod storage;
mod store;

/// The four components of one authenticated session, wired together.
///
/// Each `Session` owns its own refresh state; two sessions never share a
/// refresh even when they share storage under different namespaces.
#[derive(Debug, Clone)]
pub struct Session {
    store: TokenStore,
    coordinator: RefreshCoordinator,
    lifecycle: Arc<SessionLifecycle>,
    anonymous_paths: Vec<String>,
    config: SessionConfig,
}

impl Session {
    pub fn new(storage: Arc<dyn Storage>, exchange: Arc<dyn RefreshExchange>, config: SessionConfig) -> Self {
        let store = TokenStore::with_namespace(storage, &config.storage_namespace);
        let coordinator = RefreshCoordinator::new(store.clone(), exchange).timeout(config.refresh_timeout_duration());
        let lifecycle = Arc::new(SessionLifecycle::new(store.clone()));
        Self {
            store,
            coordinator,
            lifecycle,
            anonymous_paths: config.anonymous_paths.clone(),
            config,
        }
    }

    /// Refresh against `config.refresh_path`, resolved on `client`'s base url and
    /// sent on its transport. Anonymous paths are resolved the same way.
    pub fn over_http(client: &Client, storage: Arc<dyn Storage>, config: SessionConfig) -> Result<Self> {
        let endpoint = client.build_uri(&config.refresh_path)?;
        let anonymous_paths = config
            .anonymous_paths
            .iter()
            .map(|p| Ok(client.build_uri(p)?.path().to_string()))
            .collect::<Result<Vec<_>>>()?;
        let exchange = HttpRefreshExchange::new(client.transport().clone(), endpoint);
        let mut session = Self::new(storage, Arc::new(exchange), config);
        session.anonymous_paths = anonymous_paths;
        Ok(session)
    }

    /// A ready-to-use client for `base_url` whose every request passes through
    /// this session's gateway.
    pub fn connect(base_url: &str, storage: Arc<dyn Storage>, config: SessionConfig) -> Result<(Client, Self)> {
        let transport = HyperTransport::new().timeout(Some(config.request_timeout_duration()));
        let client = Client::with_transport(Arc::new(transport)).base_url(base_url);
        let session = Self::over_http(&client, storage, config)?;
        let client = client.with_middleware(session.gateway());
        Ok((client, session))
    }

    pub fn gateway(&self) -> RequestGateway {
        let gateway = self
            .anonymous_paths
            .iter()
            .fold(RequestGateway::new(self.coordinator.clone(), self.lifecycle.clone()), |g, p| {
                g.anonymous_path(p.as_str())
            });
        gateway.preemptive_refresh(self.config.preemptive_refresh_skew_secs.map(std::time::Duration::from_secs))
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn login(&self, pair: &CredentialPair) -> std::io::Result<()> {
        self.lifecycle.begin(pair)
    }

    pub fn logout(&self) -> std::io::Result<()> {
        self.lifecycle.logout()
    }

    pub fn on_session_expired(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.lifecycle.on_session_expired(listener)
    }

    pub fn current_user(&self) -> Option<Claims> {
        self.lifecycle.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lifecycle.is_authenticated()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::StatusCode;
    use serde_json::json;

    use crate::mock::{unsigned_token, MockTransport};
    use crate::Response;

    use super::*;

    #[tokio::test]
    async fn test_login_request_refresh_logout() {
        let transport = Arc::new(MockTransport::new(|request: crate::Request| async move {
            match (request.path(), request.bearer_token()) {
                ("/auth/login", None) => Response::json_with_status(StatusCode::OK, json!({
                    "access_token": "a1",
                    "refresh_token": "r1",
                })),
                ("/api/auth/refresh", None) => Response::json_with_status(StatusCode::OK, json!({
                    "access_token": "a2",
                    "refresh_token": "r2",
                })),
                (_, Some("a2")) => Response::json_with_status(StatusCode::OK, json!([{"id": 1}])),
                _ => Response::json_with_status(StatusCode::UNAUTHORIZED, json!({})),
            }
        }));
        let client = Client::with_transport(transport.clone()).base_url("http://api.test");
        let config = SessionConfig::new().refresh_path("/api/auth/refresh").storage_namespace("app");
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let session = Session::over_http(&client, storage.clone(), config).unwrap();
        let client = client.with_middleware(session.gateway());
        let expired = Arc::new(AtomicUsize::new(0));
        let expired_ = expired.clone();
        session.on_session_expired(move || {
            expired_.fetch_add(1, Ordering::SeqCst);
        });

        let pair: RefreshResponse = client.post("/auth/login").json(json!({"email": "a@b.c"})).await.unwrap().json().unwrap();
        session.login(&pair.into_pair("")).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(storage.get("app.access_token").unwrap().as_deref(), Some("a1"));

        let res = client.get("/projects").await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(session.store().get(), Some(CredentialPair::new("a2", "r2")));
        assert_eq!(transport.count("/api/auth/refresh"), 1);

        session.logout().unwrap();
        assert!(!session.is_authenticated());
        assert!(client.get("/projects").await.unwrap_err().is_unauthenticated());
        assert_eq!(expired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_paths_follow_base_url() {
        let transport = Arc::new(MockTransport::new(|_| async {
            Response::json_with_status(StatusCode::UNAUTHORIZED, json!({"error": "bad password"}))
        }));
        let client = Client::with_transport(transport.clone()).base_url("http://api.test/v1");
        let session = Session::over_http(&client, Arc::new(MemoryStorage::new()), SessionConfig::new()).unwrap();
        session.login(&CredentialPair::new("a1", "r1")).unwrap();
        let client = client.with_middleware(session.gateway());

        let res = client.post("/auth/login").json(json!({"email": "a@b.c"})).await.unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.json::<serde_json::Value>().unwrap(), json!({"error": "bad password"}));
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path(), "/v1/auth/login");
        assert!(sent[0].bearer_token().is_none());
        assert_eq!(transport.count("/v1/auth/refresh"), 0);
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_current_user_survives_restart() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let exchange = Arc::new(HttpRefreshExchange::new(
            Arc::new(MockTransport::ok()),
            http::Uri::from_static("http://api.test/auth/refresh"),
        ));
        let token = unsigned_token(&json!({"sub": "u1", "exp": claims::now_unix() + 600}));
        Session::new(storage.clone(), exchange.clone(), SessionConfig::new())
            .login(&CredentialPair::new(token, "r1"))
            .unwrap();

        let reopened = Session::new(storage, exchange, SessionConfig::new());
        assert!(reopened.is_authenticated());
        assert_eq!(reopened.current_user().and_then(|c| c.subject).as_deref(), Some("u1"));
    }
}
