//! An HTTP client whose requests carry bearer credentials that renew themselves.
//!
//! Behavior is composed from [`Middleware`]. The [`auth::RequestGateway`]
//! middleware attaches the stored access token, and on a `401` refreshes the
//! credential pair once (however many requests failed at the same time) and
//! replays each request once.
pub mod auth;
mod body;
mod client;
pub mod config;
mod error;
pub mod middleware;
mod request;
mod response;
pub mod sanitize;
pub mod services;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use body::InMemoryBody;
pub use client::Client;
pub use config::SessionConfig;
pub use error::{Error, ProtocolError, Result};
pub use middleware::{Logger, Middleware, Next};
pub use request::{Request, RequestBuilder};
pub use response::{Response, ResponseParts};

pub use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
