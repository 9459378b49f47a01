use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::claims::{now_unix, Claims};
use super::credentials::CredentialPair;
use super::storage::{MemoryStorage, Storage};

/// Durable holder of the current [`CredentialPair`].
///
/// Both tokens live under `<namespace>.access_token` and `<namespace>.refresh_token`
/// and are always written and removed in one batch.
///
/// Clones share a session generation, bumped on every login, logout and expiry.
/// A refresh started under one generation may only write under that generation.
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    access_key: String,
    refresh_key: String,
    generation: Arc<Mutex<u64>>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_namespace(storage, "session")
    }

    pub fn with_namespace(storage: Arc<dyn Storage>, namespace: &str) -> Self {
        Self {
            storage,
            access_key: format!("{}.access_token", namespace),
            refresh_key: format!("{}.refresh_token", namespace),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// The stored pair, or `None` when nothing (or only half a pair) is stored.
    /// Storage failures are logged and read as absent.
    pub fn get(&self) -> Option<CredentialPair> {
        let read = |key: &str| match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "token storage read failed");
                None
            }
        };
        match (read(&self.access_key), read(&self.refresh_key)) {
            (Some(access_token), Some(refresh_token)) => Some(CredentialPair { access_token, refresh_token }),
            (None, None) => None,
            _ => {
                warn!(namespace = %self.namespace(), "token storage holds half a credential pair; ignoring it");
                None
            }
        }
    }

    pub fn set(&self, pair: &CredentialPair) -> io::Result<()> {
        self.storage.set_all(&[
            (self.access_key.as_str(), pair.access_token.as_str()),
            (self.refresh_key.as_str(), pair.refresh_token.as_str()),
        ])
    }

    pub fn clear(&self) -> io::Result<()> {
        self.storage.remove_all(&[self.access_key.as_str(), self.refresh_key.as_str()])
    }

    fn generation_lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        *self.generation_lock()
    }

    /// Open a new session generation holding `pair`, or nothing.
    pub(crate) fn renew(&self, pair: Option<&CredentialPair>) -> io::Result<u64> {
        let mut generation = self.generation_lock();
        *generation += 1;
        match pair {
            Some(pair) => self.set(pair)?,
            None => self.clear()?,
        }
        Ok(*generation)
    }

    /// Store `pair` only if no login, logout or expiry happened since `generation`.
    pub(crate) fn set_if_current(&self, pair: &CredentialPair, generation: u64) -> io::Result<bool> {
        let current = self.generation_lock();
        if *current != generation {
            return Ok(false);
        }
        self.set(pair)?;
        Ok(true)
    }

    pub(crate) fn clear_if_current(&self, generation: u64) -> io::Result<bool> {
        let current = self.generation_lock();
        if *current != generation {
            return Ok(false);
        }
        self.clear()?;
        Ok(true)
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|pair| pair.access_token)
    }

    /// Claims of the stored access token, if it decodes.
    pub fn claims(&self) -> Option<Claims> {
        Claims::decode(&self.get()?.access_token).ok()
    }

    fn namespace(&self) -> &str {
        self.access_key.trim_end_matches(".access_token")
    }

    /// Whether `token` is expired now or within `skew_seconds`. Tokens that do not
    /// decode count as expired.
    pub fn is_expired(token: &str, skew_seconds: u64) -> bool {
        Self::is_expired_at(token, skew_seconds, now_unix())
    }

    pub fn is_expired_at(token: &str, skew_seconds: u64, now: u64) -> bool {
        match Claims::decode(token) {
            Ok(claims) => claims.is_expired_at(now, skew_seconds),
            Err(_) => true,
        }
    }

    /// Seconds until `token` expires (negative once past), `None` if it does not decode.
    pub fn expires_in_seconds(token: &str) -> Option<i64> {
        Claims::decode(token).ok().map(|claims| claims.expires_in_at(now_unix()))
    }
}
