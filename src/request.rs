use bytes::Bytes;
use http::header::{HeaderName, AUTHORIZATION};
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use http_body_util::Full;

use crate::{InMemoryBody, Result};

pub use builder::RequestBuilder;

mod builder;

/// A transport-agnostic request: method, target, headers, and a fully buffered body.
///
/// Bodies are always in memory so the gateway can replay a request after refreshing
/// credentials.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: InMemoryBody,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::default(),
            headers: HeaderMap::new(),
            body: InMemoryBody::Empty,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &InMemoryBody {
        &self.body
    }

    pub fn set_body(mut self, body: InMemoryBody) -> Self {
        self.body = body;
        self
    }

    pub fn set_header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn set_url(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Replace any existing Authorization header with `Bearer <token>`.
    pub fn set_bearer(mut self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// The bearer token currently attached, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        value.strip_prefix("Bearer ")
    }

    pub fn into_http(self) -> Result<http::Request<Full<Bytes>>> {
        let bytes = self.body.to_bytes()?;
        let mut request = http::Request::new(Full::new(bytes));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_bearer_replaces_existing() {
        let request = Request::new(Method::GET, Uri::from_static("http://localhost/projects"))
            .set_bearer("old")
            .unwrap()
            .set_bearer("new")
            .unwrap();
        assert_eq!(request.bearer_token(), Some("new"));
        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_bearer_rejects_header_injection() {
        let request = Request::new(Method::GET, Uri::from_static("http://localhost/"));
        assert!(request.set_bearer("abc\r\nX-Evil: 1").is_err());
    }
}
