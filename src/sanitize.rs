//! Redaction of credentials before anything is logged.
use std::sync::OnceLock;

use http::{HeaderMap, HeaderValue};
use regex::Regex;
use serde_json::Value;

static REGEX: OnceLock<Option<Regex>> = OnceLock::new();

pub static SANITIZED_VALUE: &str = "**********";

fn regex() -> Option<&'static Regex> {
    REGEX
        .get_or_init(|| {
            let s = ["secret", "key", "session", "password", "token"]
                .map(|s| format!(r#"(\b|[-_]){s}(\b|[-_])"#))
                .join("|");
            Regex::new(&format!(r#"(?i)({s})"#)).ok()
        })
        .as_ref()
}

pub fn should_sanitize(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "authorization" | "cookie" | "password" | "set-cookie" | "proxy-authorization" => true,
        _ => regex().is_some_and(|r| r.is_match(&key)),
    }
}

pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if should_sanitize(key) {
                    *value = Value::String(SANITIZED_VALUE.to_string());
                } else {
                    sanitize_value(value);
                }
            }
        }
        Value::Array(vec) => {
            for value in vec.iter_mut() {
                sanitize_value(value);
            }
        }
        _ => {}
    }
}

/// Copy of `headers` with every sensitive value masked.
pub fn sanitized_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    let sanitized = HeaderValue::from_static(SANITIZED_VALUE);
    for (key, value) in headers.iter_mut() {
        if value.is_sensitive() || should_sanitize(key.as_str()) {
            *value = sanitized.clone();
        }
    }
    headers
}
