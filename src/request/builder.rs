use std::borrow::Cow;
use std::future::IntoFuture;
use std::str::FromStr;

use futures::future::BoxFuture;
use http::header::{HeaderName, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use serde::Serialize;
use serde_json::Value;

use crate::{Client, Error, InMemoryBody, Request, Response, Result};

/// Fluent construction of a [`Request`] bound to a [`Client`].
///
/// Invalid header names/values and serialization failures are remembered and
/// reported when the request is built or sent.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    client: &'a Client,

    pub version: Version,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<InMemoryBody>,
    error: Option<Error>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(client: &'a Client, method: Method, uri: Uri) -> RequestBuilder<'a> {
        RequestBuilder {
            client,
            version: Default::default(),
            method,
            uri,
            headers: Default::default(),
            body: Default::default(),
            error: None,
        }
    }

    pub(crate) fn fail(mut self, error: impl Into<Error>) -> Self {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        self
    }

    /// Overwrite the current body with the provided JSON object.
    pub fn set_json<S: Serialize>(mut self, obj: S) -> Self {
        match serde_json::to_value(obj) {
            Ok(value) => self.body = Some(InMemoryBody::Json(value)),
            Err(e) => return self.fail(e),
        }
        self.headers.entry(CONTENT_TYPE).or_insert(HeaderValue::from_static("application/json; charset=utf-8"));
        self.headers.entry(ACCEPT).or_insert(HeaderValue::from_static("application/json"));
        self
    }

    /// Add the provided JSON object to the current body.
    pub fn json<S: Serialize>(mut self, obj: S) -> Self {
        match self.body {
            None => self.set_json(obj),
            Some(InMemoryBody::Json(Value::Object(ref mut body))) => {
                match serde_json::to_value(obj) {
                    Ok(Value::Object(obj)) => body.extend(obj),
                    Ok(_) => return self.fail(Error::custom("Tried to push a non-object to a json body.")),
                    Err(e) => return self.fail(e),
                }
                self
            }
            _ => self.fail(Error::custom("Tried to call .json() on a non-json body. Use .set_json to force a json body.")),
        }
    }

    /// Sets content-type to `text/plain` and the body to the supplied text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(InMemoryBody::Text(text.into()));
        self.headers.entry(CONTENT_TYPE).or_insert(HeaderValue::from_static("text/plain"));
        self
    }

    /// Sets content-type to `application/octet-stream` and the body to the supplied bytes.
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(InMemoryBody::Bytes(bytes));
        self.headers.entry(CONTENT_TYPE).or_insert(HeaderValue::from_static("application/octet-stream"));
        self
    }

    pub fn headers<S: AsRef<str>, I: Iterator<Item = (S, S)>>(mut self, headers: I) -> Self {
        for (k, v) in headers {
            self = self.header(k.as_ref(), v.as_ref());
        }
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        let key = match HeaderName::from_str(key) {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(key, value);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Attach a bearer token explicitly. Requests sent through a client with a
    /// [`crate::auth::RequestGateway`] have this header overwritten.
    pub fn bearer_auth(mut self, token: &str) -> Self {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Add a url query parameter, but keep existing parameters.
    pub fn query(mut self, k: &str, v: &str) -> Self {
        let mut parts = std::mem::take(&mut self.uri).into_parts();
        let (path, existing) = match &parts.path_and_query {
            Some(pq) => (pq.path().to_string(), pq.query().map(str::to_string)),
            None => ("/".to_string(), None),
        };
        let pair = format!("{}={}", urlencoding::encode(k), urlencoding::encode(v));
        let pq = match existing {
            Some(q) => format!("{}?{}&{}", path, q, pair),
            None => format!("{}?{}", path, pair),
        };
        match PathAndQuery::from_str(&pq) {
            Ok(pq) => parts.path_and_query = Some(pq),
            Err(e) => return self.fail(e),
        }
        match Uri::from_parts(parts) {
            Ok(uri) => self.uri = uri,
            Err(e) => return self.fail(Error::custom(&e.to_string())),
        }
        self
    }

    /// Overwrite the query with the fields of a flat object.
    pub fn set_query<S: Serialize>(mut self, obj: S) -> Self {
        let map = match serde_json::to_value(obj) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return self.fail(Error::custom("object in .set_query was not a Map")),
            Err(e) => return self.fail(e),
        };
        let mut parts = std::mem::take(&mut self.uri).into_parts();
        let path = parts.path_and_query.as_ref().map(|pq| pq.path().to_string()).unwrap_or_else(|| "/".to_string());
        match PathAndQuery::from_str(&path) {
            Ok(pq) => parts.path_and_query = Some(pq),
            Err(e) => return self.fail(e),
        }
        match Uri::from_parts(parts) {
            Ok(uri) => self.uri = uri,
            Err(e) => return self.fail(Error::custom(&e.to_string())),
        }
        for (k, v) in map.iter() {
            let v = match v {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                Value::Number(n) => Cow::Owned(n.to_string()),
                Value::Bool(b) => Cow::Owned(b.to_string()),
                Value::Null => Cow::Borrowed(""),
                _ => return self.fail(Error::custom("Invalid query value")),
            };
            self = self.query(k, &v);
        }
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Warning: Does not set content-type!
    pub fn body(mut self, body: InMemoryBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<Request> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Request {
            method: self.method,
            uri: self.uri,
            version: self.version,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        })
    }

    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        let request = self.build()?;
        client.send(request).await
    }
}

impl<'a> IntoFuture for RequestBuilder<'a> {
    type Output = Result<Response>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::mock::MockTransport;

    use super::*;

    #[test]
    fn test_query_keeps_existing_params() {
        let client = Client::with_transport(Arc::new(MockTransport::ok()));
        let r = RequestBuilder::new(&client, Method::GET, "http://example.com/foo?a=1".parse().unwrap())
            .query("b", "2 3");
        assert_eq!(r.uri.to_string(), "http://example.com/foo?a=1&b=2%203");
    }

    #[test]
    fn test_json_merges_objects() {
        let client = Client::with_transport(Arc::new(MockTransport::ok()));
        let request = RequestBuilder::new(&client, Method::POST, "http://example.com/tasks".parse().unwrap())
            .json(json!({"title": "write docs"}))
            .json(json!({"project_id": 7}))
            .build()
            .unwrap();
        assert_eq!(request.body(), &InMemoryBody::Json(json!({"title": "write docs", "project_id": 7})));
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
    }

    #[test]
    fn test_bad_header_fails_at_build() {
        let client = Client::with_transport(Arc::new(MockTransport::ok()));
        let result = RequestBuilder::new(&client, Method::GET, "http://example.com/".parse().unwrap())
            .header("bad header", "x")
            .build();
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
