use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::Client;
use crate::sanitize::sanitized_headers;
use crate::{Error, Request, Response, Result};

pub type MiddlewareStack = Vec<Arc<dyn Middleware>>;

/// The rest of the pipeline after the current middleware.
///
/// `Next` is `Copy`, so a middleware may run the remainder of the stack more than
/// once (the gateway does so to replay a request after refreshing).
#[derive(Debug, Copy, Clone)]
pub struct Next<'a> {
    pub client: &'a Client,
    pub(crate) middlewares: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    pub async fn run(self, request: Request) -> Result<Response> {
        if let Some((middleware, rest)) = self.middlewares.split_first() {
            let next = Next {
                client: self.client,
                middlewares: rest,
            };
            middleware.handle(request, next).await
        } else {
            self.client.transport.send(request).await
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync + Debug {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        next.run(request).await
    }
}

/// Logs every request and its outcome at `debug`, with credentials masked.
///
/// Install it after the gateway to see the headers actually sent, retries included.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let url = request.uri().to_string();
        let method = request.method().clone();
        let headers = sanitized_headers(request.headers());
        let mut body = request.body().clone();
        body.sanitize();
        debug!(%method, %url, ?headers, ?body, ">>> request");
        let started = Instant::now();
        let res = next.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &res {
            Ok(res) => {
                let headers = sanitized_headers(res.headers());
                let mut body = res.body().clone();
                body.sanitize();
                debug!(%method, %url, status = res.status().as_u16(), elapsed_ms, ?headers, ?body, "<<< response");
            }
            Err(Error::Protocol(e)) => warn!(%method, %url, elapsed_ms, error = %e, "<<< transport failure"),
            Err(e) => debug!(%method, %url, elapsed_ms, error = %e, "<<< failed"),
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;
    use serde_json::json;

    use crate::mock::MockTransport;

    use super::*;

    #[derive(Debug)]
    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
            self.1.lock().unwrap().push(self.0);
            next.run(request).await
        }
    }

    #[tokio::test]
    async fn test_middlewares_run_in_insertion_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(MockTransport::ok());
        let client = Client::with_transport(transport.clone())
            .with_middleware(Tag("outer", seen.clone()))
            .with_middleware(Logger)
            .with_middleware(Tag("inner", seen.clone()));
        let res = client.post("http://api.test/login").json(json!({"password": "hunter2"})).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(transport.requests().len(), 1);
    }
}
