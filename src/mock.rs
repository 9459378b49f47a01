//! Test doubles: a scriptable [`Transport`] and unsigned tokens with chosen claims.
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::BoxFuture;
use http::StatusCode;
use serde_json::Value;

use crate::transport::Transport;
use crate::{InMemoryBody, Request, Response, Result};

type Handler = Box<dyn Fn(Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Answers every request with the async closure it was built from and records
/// what it was sent, in arrival order.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl Debug for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport {{ requests: {} }}", self.requests().len())
    }
}

impl MockTransport {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |request| Box::pin(handler(request))),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Responds `200 OK` with an empty body to everything.
    pub fn ok() -> Self {
        Self::new(|_| async { Ok(Response::new(StatusCode::OK, Default::default(), InMemoryBody::Empty)) })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path() == path).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.handler)(request).await
    }
}

/// A three-segment token carrying `claims`, with a placeholder signature.
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
