use std::hash::Hasher;

use bytes::Bytes;
use http::HeaderValue;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::sanitize_value;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum InMemoryBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl InMemoryBody {
    pub fn new_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        InMemoryBody::Bytes(bytes.into())
    }

    pub fn new_text(text: impl Into<String>) -> Self {
        InMemoryBody::Text(text.into())
    }

    pub fn new_json(value: impl Serialize) -> serde_json::Result<Self> {
        Ok(InMemoryBody::Json(serde_json::to_value(value)?))
    }

    /// Interpret a received payload. JSON content types are parsed eagerly; a JSON
    /// content type with an unparseable payload is kept as text so the caller can
    /// still inspect it.
    pub fn from_bytes(bytes: Bytes, content_type: Option<&HeaderValue>) -> Self {
        if bytes.is_empty() {
            return InMemoryBody::Empty;
        }
        let mime = content_type
            .and_then(|ct| ct.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());
        let is_json = mime.as_deref().is_some_and(|m| m == "application/json" || m.ends_with("+json"));
        if is_json {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                return InMemoryBody::Json(value);
            }
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => InMemoryBody::Text(text),
            Err(e) => InMemoryBody::Bytes(e.into_bytes()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        use InMemoryBody::{Bytes, Empty, Json, Text};
        match self {
            Empty => true,
            Bytes(b) => b.is_empty(),
            Text(s) => s.is_empty(),
            Json(_) => false,
        }
    }

    pub fn text(self) -> Result<String> {
        match self {
            InMemoryBody::Empty => Ok(String::new()),
            InMemoryBody::Bytes(b) => Ok(String::from_utf8(b)?),
            InMemoryBody::Text(s) => Ok(s),
            InMemoryBody::Json(val) => Ok(serde_json::to_string(&val)?),
        }
    }

    pub fn json<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        match self {
            InMemoryBody::Empty => Err(serde_json::Error::custom("Empty body")),
            InMemoryBody::Bytes(b) => serde_json::from_slice(&b),
            InMemoryBody::Text(t) => serde_json::from_str(&t),
            InMemoryBody::Json(v) => serde_json::from_value(v),
        }
    }

    /// Wire representation, used by the transport.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            InMemoryBody::Empty => Ok(Bytes::new()),
            InMemoryBody::Bytes(b) => Ok(Bytes::from(b.clone())),
            InMemoryBody::Text(s) => Ok(Bytes::from(s.clone())),
            InMemoryBody::Json(val) => Ok(Bytes::from(serde_json::to_vec(val)?)),
        }
    }

    pub fn sanitize(&mut self) {
        if let InMemoryBody::Json(value) = self {
            sanitize_value(value);
        }
    }
}

impl std::hash::Hash for InMemoryBody {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use InMemoryBody::{Bytes, Empty, Json, Text};
        match self {
            Empty => state.write_u8(0),
            Bytes(b) => {
                state.write_u8(1);
                state.write(b.as_slice());
            }
            Text(s) => {
                state.write_u8(2);
                state.write(s.as_bytes());
            }
            Json(v) => {
                state.write_u8(3);
                state.write(v.to_string().as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_content_type_is_parsed() {
        let ct = HeaderValue::from_static("application/json; charset=utf-8");
        let body = InMemoryBody::from_bytes(Bytes::from_static(br#"{"id":1}"#), Some(&ct));
        assert_eq!(body, InMemoryBody::Json(json!({"id": 1})));
    }

    #[test]
    fn test_broken_json_falls_back_to_text() {
        let ct = HeaderValue::from_static("application/json");
        let body = InMemoryBody::from_bytes(Bytes::from_static(b"{oops"), Some(&ct));
        assert_eq!(body, InMemoryBody::Text("{oops".to_string()));
    }

    #[test]
    fn test_binary_payload() {
        let body = InMemoryBody::from_bytes(Bytes::from_static(&[0xff, 0xfe]), None);
        assert_eq!(body, InMemoryBody::Bytes(vec![0xff, 0xfe]));
        assert!(InMemoryBody::from_bytes(Bytes::new(), None).is_empty());
    }

    #[test]
    fn test_text_body_decodes_as_json() {
        let body = InMemoryBody::new_text(r#"{"name":"alpha"}"#);
        let value: Value = body.json().unwrap();
        assert_eq!(value["name"], "alpha");
    }
}
