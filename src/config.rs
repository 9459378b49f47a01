use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for an authenticated session. Every field has a default, so a partial
/// JSON document (or none at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path (or absolute url) of the refresh endpoint.
    pub refresh_path: String,
    /// Prefix of the two persisted token keys.
    pub storage_namespace: String,
    pub request_timeout_ms: u64,
    /// Upper bound for one refresh exchange. Waiters are rejected when it elapses.
    pub refresh_timeout_ms: u64,
    /// Refresh before sending when the access token expires within this many seconds.
    /// Disabled when `None`.
    pub preemptive_refresh_skew_secs: Option<u64>,
    /// Paths sent without credentials and never refreshed, e.g. the login endpoint.
    pub anonymous_paths: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_path: "/auth/refresh".to_string(),
            storage_namespace: "session".to_string(),
            request_timeout_ms: 30_000,
            refresh_timeout_ms: 15_000,
            preemptive_refresh_skew_secs: None,
            anonymous_paths: vec!["/auth/login".to_string()],
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_ms = millis(timeout);
        self
    }

    /// `skew` is rounded up to whole seconds.
    pub fn preemptive_refresh(mut self, skew: Option<Duration>) -> Self {
        self.preemptive_refresh_skew_secs = skew.map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0));
        self
    }

    pub fn anonymous_path(mut self, path: impl Into<String>) -> Self {
        self.anonymous_paths.push(path.into());
        self
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
