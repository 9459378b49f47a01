use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, InMemoryBody, Result};

#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) parts: ResponseParts,
    pub(crate) body: InMemoryBody,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: InMemoryBody) -> Self {
        Self::from_parts(ResponseParts {
            status,
            headers,
            version: Version::default(),
        }, body)
    }

    /// Shorthand for a JSON response, mostly useful for stubbing transports.
    pub fn json_with_status(status: StatusCode, value: impl Serialize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
        Ok(Self::new(status, headers, InMemoryBody::new_json(value)?))
    }

    pub fn from_parts(parts: ResponseParts, body: InMemoryBody) -> Self {
        Self { parts, body }
    }

    pub fn into_parts(self) -> (ResponseParts, InMemoryBody) {
        (self.parts, self.body)
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn body(&self) -> &InMemoryBody {
        &self.body
    }

    pub fn is_unauthorized(&self) -> bool {
        self.parts.status == StatusCode::UNAUTHORIZED
    }

    pub fn error_for_status(self) -> Result<Self> {
        let status = self.status();
        if status.is_server_error() || status.is_client_error() {
            Err(Error::HttpError(self))
        } else {
            Ok(self)
        }
    }

    pub fn text(self) -> Result<String> {
        self.body.text()
    }

    pub fn json<U: DeserializeOwned>(self) -> Result<U> {
        Ok(self.body.json()?)
    }

    pub fn bytes(self) -> Result<Bytes> {
        self.body.to_bytes()
    }

    pub fn sanitize(&mut self) {
        self.body.sanitize();
    }
}
