use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::Arc;

use http::header::{HeaderName, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::middleware::{Middleware, MiddlewareStack, Next};
use crate::transport::{HyperTransport, Transport};
use crate::{Request, RequestBuilder, Response, Result};

static APP_USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
);

/// Entry point for every outbound call. Requests pass through the middleware stack
/// in the order middlewares were added, then reach the transport.
pub struct Client {
    base_url: Option<String>,
    default_headers: HeaderMap,
    pub(crate) middlewares: MiddlewareStack,
    pub(crate) transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client {{ base_url: {:?}, middlewares: {} }}", self.base_url, self.middlewares.len())
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HyperTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(APP_USER_AGENT));
        Client {
            base_url: None,
            default_headers,
            middlewares: Vec::new(),
            transport,
        }
    }

    /// Set a `base_url` so you can pass relative paths instead of full URLs.
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_middleware<T: Middleware + 'static>(mut self, middleware: T) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn no_default_headers(mut self) -> Self {
        self.default_headers = HeaderMap::new();
        self
    }

    pub fn default_header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(key, value);
        self
    }

    /// Add `headers` to every request, replacing defaults with the same name.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        for (key, value) in headers.iter() {
            self.default_headers.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve a path against the base url. Absolute urls are returned as-is.
    pub fn build_uri(&self, uri_or_path: &str) -> Result<Uri> {
        if let Ok(uri) = Uri::from_str(uri_or_path) {
            if uri.scheme().is_some() && uri.host().is_some() {
                return Ok(uri);
            }
        }
        let uri = match &self.base_url {
            Some(base) if uri_or_path.starts_with('/') => format!("{}{}", base, uri_or_path),
            Some(base) => format!("{}/{}", base, uri_or_path),
            None => uri_or_path.to_string(),
        };
        Ok(Uri::from_str(&uri)?)
    }

    pub fn request(&self, method: Method, uri_or_path: &str) -> RequestBuilder {
        match self.build_uri(uri_or_path) {
            Ok(uri) => {
                let mut builder = RequestBuilder::new(self, method, uri);
                builder.headers = self.default_headers.clone();
                builder
            }
            Err(e) => RequestBuilder::new(self, method, Uri::default()).fail(e),
        }
    }

    pub fn get(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::GET, uri_or_path)
    }

    pub fn post(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::POST, uri_or_path)
    }

    pub fn put(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::PUT, uri_or_path)
    }

    pub fn patch(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::PATCH, uri_or_path)
    }

    pub fn delete(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::DELETE, uri_or_path)
    }

    /// Run `request` through every middleware and the transport.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let next = Next {
            client: self,
            middlewares: self.middlewares.as_slice(),
        };
        next.run(request).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use crate::mock::MockTransport;

    use super::*;

    #[test]
    fn test_build_uri() {
        let client = Client::with_transport(Arc::new(MockTransport::ok())).base_url("https://api.example.com/v1/");
        assert_eq!(client.build_uri("/projects").unwrap().to_string(), "https://api.example.com/v1/projects");
        assert_eq!(client.build_uri("tasks").unwrap().to_string(), "https://api.example.com/v1/tasks");
        assert_eq!(client.build_uri("http://other.test/x").unwrap().to_string(), "http://other.test/x");
    }

    #[tokio::test]
    async fn test_default_headers_are_sent() {
        let transport = Arc::new(MockTransport::new(|_| async {
            Response::json_with_status(StatusCode::OK, json!({"ok": true}))
        }));
        let client = Client::with_transport(transport.clone()).base_url("http://api.test");
        let res = client.get("/ping").await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers()[USER_AGENT], APP_USER_AGENT);
        assert_eq!(sent[0].uri().to_string(), "http://api.test/ping");
    }
}
