use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::claims::Claims;
use super::credentials::CredentialPair;
use super::store::TokenStore;

type Listener = Box<dyn Fn() + Send + Sync>;

/// Signed-in state of the application, and the single place that announces
/// when a session has expired.
///
/// Expiry listeners run at most once per session: the first unrecoverable
/// authentication failure fires them, later ones are absorbed until [`begin`] starts
/// a new session.
///
/// [`begin`]: SessionLifecycle::begin
pub struct SessionLifecycle {
    store: TokenStore,
    user: RwLock<Option<Claims>>,
    expired: AtomicBool,
    listeners: RwLock<Vec<Listener>>,
}

impl Debug for SessionLifecycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("user", &self.current_user())
            .field("expired", &self.expired.load(Ordering::SeqCst))
            .field("listeners", &self.listeners.read().map(|l| l.len()).unwrap_or(0))
            .finish()
    }
}

impl SessionLifecycle {
    pub fn new(store: TokenStore) -> Self {
        let user = store.claims();
        Self {
            store,
            user: RwLock::new(user),
            expired: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback for session expiry. Callbacks run on the task that
    /// observed the failure and must not block.
    pub fn on_session_expired(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Start a session with credentials from a successful login.
    pub fn begin(&self, pair: &CredentialPair) -> std::io::Result<()> {
        self.store.renew(Some(pair))?;
        let claims = pair.claims().ok();
        if claims.is_none() {
            warn!("access token carries no readable claims; current user unknown");
        }
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = claims;
        self.expired.store(false, Ordering::SeqCst);
        info!(user = ?self.current_user().and_then(|c| c.subject), "session started");
        Ok(())
    }

    /// End the session at the user's request. Expiry listeners do not run.
    pub fn logout(&self) -> std::io::Result<()> {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.expired.store(false, Ordering::SeqCst);
        self.store.renew(None)?;
        info!("logged out");
        Ok(())
    }

    /// Record that the session can no longer be recovered. Stored credentials are
    /// cleared on every call; returns whether this call was the one that notified
    /// listeners.
    pub fn session_expired(&self) -> bool {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.store.renew(None) {
            warn!(error = %e, "could not clear token storage");
        }
        if self.expired.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!("session expired");
        for listener in self.listeners.read().unwrap_or_else(PoisonError::into_inner).iter() {
            listener();
        }
        true
    }

    /// [`session_expired`](Self::session_expired) for a failure observed under
    /// store `generation`. Ignored when a login, logout or earlier expiry has
    /// already replaced that session.
    pub(crate) fn session_expired_during(&self, generation: u64) -> bool {
        if self.store.generation() != generation {
            debug!(generation, "failure belongs to a session that already ended");
            return false;
        }
        self.session_expired()
    }

    pub fn current_user(&self) -> Option<Claims> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use serde_json::json;

    use crate::mock::unsigned_token;

    use super::*;

    fn counting(lifecycle: &SessionLifecycle) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_ = fired.clone();
        lifecycle.on_session_expired(move || {
            fired_.fetch_add(1, Ordering::SeqCst);
        });
        fired
    }

    #[test]
    fn test_fires_once_per_session() {
        let lifecycle = SessionLifecycle::new(TokenStore::in_memory());
        let fired = counting(&lifecycle);

        assert!(lifecycle.session_expired());
        assert!(!lifecycle.session_expired());
        assert!(!lifecycle.session_expired());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        lifecycle.begin(&CredentialPair::new("a1", "r1")).unwrap();
        assert!(!lifecycle.is_expired());
        assert!(lifecycle.session_expired());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_begin_reads_user_from_token() {
        let lifecycle = SessionLifecycle::new(TokenStore::in_memory());
        assert!(!lifecycle.is_authenticated());
        let token = unsigned_token(&json!({"sub": "u7", "role": "admin", "exp": 4_000_000_000u64}));
        lifecycle.begin(&CredentialPair::new(token, "r1")).unwrap();

        assert!(lifecycle.is_authenticated());
        let user = lifecycle.current_user().unwrap();
        assert_eq!(user.subject.as_deref(), Some("u7"));
        assert_eq!(user.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_logout_is_silent() {
        let lifecycle = SessionLifecycle::new(TokenStore::in_memory());
        let fired = counting(&lifecycle);
        lifecycle.begin(&CredentialPair::new("a1", "r1")).unwrap();

        lifecycle.logout().unwrap();

        assert!(!lifecycle.is_authenticated());
        assert_eq!(lifecycle.current_user(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_expiry_clears_credentials() {
        let store = TokenStore::in_memory();
        let lifecycle = SessionLifecycle::new(store.clone());
        let fired = counting(&lifecycle);
        lifecycle.begin(&CredentialPair::new("a1", "r1")).unwrap();

        lifecycle.session_expired();
        store.set(&CredentialPair::new("a2", "r2")).unwrap();
        assert!(!lifecycle.session_expired());

        assert_eq!(store.get(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_from_an_ended_session_is_ignored() {
        let store = TokenStore::in_memory();
        let lifecycle = SessionLifecycle::new(store.clone());
        let fired = counting(&lifecycle);
        lifecycle.begin(&CredentialPair::new("a1", "r1")).unwrap();
        let observed = store.generation();
        lifecycle.begin(&CredentialPair::new("b1", "s1")).unwrap();

        assert!(!lifecycle.session_expired_during(observed));

        assert_eq!(store.get(), Some(CredentialPair::new("b1", "s1")));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(lifecycle.session_expired_during(store.generation()));
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_expiry_clears_credentials() {
        let store = TokenStore::in_memory();
        let lifecycle = SessionLifecycle::new(store.clone());
        lifecycle.begin(&CredentialPair::new("a1", "r1")).unwrap();
        lifecycle.session_expired();
        assert_eq!(store.get(), None);
    }
}
