use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Claims read from an access token's payload segment.
///
/// The signature is not verified: the issuing server is trusted and these values
/// are only used to decide when to refresh and who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default, deserialize_with = "string_or_number")]
    pub subject: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "iat", default, deserialize_with = "optional_numeric_date")]
    pub issued_at: Option<u64>,
    #[serde(rename = "exp", deserialize_with = "numeric_date")]
    pub expires_at: u64,
}

#[derive(Debug)]
pub enum ClaimsError {
    Segments(usize),
    Encoding(base64::DecodeError),
    Json(serde_json::Error),
}

impl Display for ClaimsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimsError::Segments(n) => write!(f, "expected 3 token segments, found {}", n),
            ClaimsError::Encoding(e) => write!(f, "token payload is not base64url: {}", e),
            ClaimsError::Json(e) => write!(f, "token payload is not a claims object: {}", e),
        }
    }
}

impl std::error::Error for ClaimsError {}

impl Claims {
    pub fn decode(token: &str) -> Result<Claims, ClaimsError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClaimsError::Segments(segments.len()));
        }
        let payload = URL_SAFE_NO_PAD
            .decode(segments[1].trim_end_matches('='))
            .map_err(ClaimsError::Encoding)?;
        serde_json::from_slice(&payload).map_err(ClaimsError::Json)
    }

    /// Expired at `now`, or will be within `skew_seconds` of it.
    pub fn is_expired_at(&self, now: u64, skew_seconds: u64) -> bool {
        self.expires_at <= now.saturating_add(skew_seconds)
    }

    /// Seconds from `now` until expiry; negative once expired. Saturates at the
    /// bounds of `i64`.
    pub fn expires_in_at(&self, now: u64) -> i64 {
        let expires_at = i64::try_from(self.expires_at).unwrap_or(i64::MAX);
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        expires_at.saturating_sub(now)
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn as_numeric_date(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    as_numeric_date(&value).ok_or_else(|| serde::de::Error::custom("expected a numeric date"))
}

fn optional_numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => as_numeric_date(&value).map(Some).ok_or_else(|| serde::de::Error::custom("expected a numeric date")),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        _ => Err(serde::de::Error::custom("expected a string or number subject")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::mock::unsigned_token;

    use super::*;

    #[test]
    fn test_decode() {
        let token = unsigned_token(&json!({"sub": 42, "role": "manager", "iat": 1_700_000_000, "exp": 1_700_003_600}));
        let claims = Claims::decode(&token).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("42"));
        assert_eq!(claims.role.as_deref(), Some("manager"));
        assert_eq!(claims.issued_at, Some(1_700_000_000));
        assert_eq!(claims.expires_at, 1_700_003_600);
        assert_eq!(claims.expires_in_at(1_700_003_000), 600);
    }

    #[test]
    fn test_wrong_segment_count() {
        assert!(matches!(Claims::decode("abc.def"), Err(ClaimsError::Segments(2))));
        assert!(matches!(Claims::decode(""), Err(ClaimsError::Segments(1))));
    }

    #[test]
    fn test_missing_expiry() {
        let token = unsigned_token(&json!({"sub": "u1"}));
        assert!(matches!(Claims::decode(&token), Err(ClaimsError::Json(_))));
    }

    #[test]
    fn test_garbage_payload() {
        assert!(matches!(Claims::decode("a.!!!.c"), Err(ClaimsError::Encoding(_))));
    }

    #[test]
    fn test_skew() {
        let claims = Claims { subject: None, role: None, issued_at: None, expires_at: 1000 };
        assert!(!claims.is_expired_at(900, 0));
        assert!(claims.is_expired_at(900, 100));
        assert!(claims.is_expired_at(1000, 0));
    }

    #[test]
    fn test_far_future_expiry() {
        let token = unsigned_token(&json!({"sub": "u1", "exp": u64::MAX}));
        let claims = Claims::decode(&token).unwrap();
        assert_eq!(claims.expires_at, u64::MAX);
        assert!(claims.expires_in_at(now_unix()) > 0);
        assert_eq!(claims.expires_in_at(0), i64::MAX);
        assert!(!claims.is_expired_at(now_unix(), 60));
        assert!(crate::auth::TokenStore::expires_in_seconds(&token).unwrap_or(-1) > 0);
    }
}
