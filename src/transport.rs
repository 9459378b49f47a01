use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::ProtocolError;
use crate::{InMemoryBody, Request, Response, Result};

static HTTPS_CONNECTOR: OnceLock<HttpsConnector<HttpConnector>> = OnceLock::new();

fn https_connector() -> &'static HttpsConnector<HttpConnector> {
    HTTPS_CONNECTOR.get_or_init(|| {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build()
    })
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The outbound HTTP boundary. Anything that can turn a [`Request`] into a
/// status + headers + body can sit here.
///
/// Non-2xx statuses are *not* errors at this layer.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Pooled HTTP/1.1 client over rustls.
pub struct HyperTransport {
    inner: hyper_util::client::legacy::Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Option<Duration>,
}

impl Debug for HyperTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HyperTransport {{ timeout: {:?} }}", self.timeout)
    }
}

impl HyperTransport {
    pub fn new() -> Self {
        let https = https_connector().clone();
        HyperTransport {
            inner: hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(https),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Upper bound for one request, connect through body. `None` waits forever.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn roundtrip(&self, request: Request) -> Result<Response> {
        let request = request.into_http()?;
        let res = self.inner.request(request).await?;
        let (parts, body) = res.into_parts();
        let bytes = body.collect().await?.to_bytes();
        let body = InMemoryBody::from_bytes(bytes, parts.headers.get(CONTENT_TYPE));
        let mut res = Response::new(parts.status, parts.headers, body);
        res.parts.version = parts.version;
        Ok(res)
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        debug!(method = %request.method(), url = %request.uri(), "sending");
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.roundtrip(request))
                .await
                .map_err(|_| ProtocolError::Timeout(timeout))?,
            None => self.roundtrip(request).await,
        }
    }
}
