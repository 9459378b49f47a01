use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::string::FromUtf8Error;
use std::time::Duration;

use http::StatusCode;

use crate::Response;

pub type Result<T = Response, E = Error> = std::result::Result<T, E>;

/// Failures below HTTP semantics: the request never produced a usable response.
#[derive(Debug)]
pub enum ProtocolError {
    Connect(hyper_util::client::legacy::Error),
    HttpProtocol(hyper::Error),
    InvalidUri(http::uri::InvalidUri),
    InvalidHeader(String),
    Utf8(FromUtf8Error),
    JsonEncoding(serde_json::Error),
    Io(std::io::Error),
    Timeout(Duration),
}

impl StdError for ProtocolError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ProtocolError::Connect(e) => Some(e),
            ProtocolError::HttpProtocol(e) => Some(e),
            ProtocolError::InvalidUri(e) => Some(e),
            ProtocolError::Utf8(e) => Some(e),
            ProtocolError::JsonEncoding(e) => Some(e),
            ProtocolError::Io(e) => Some(e),
            ProtocolError::InvalidHeader(_) | ProtocolError::Timeout(_) => None,
        }
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Connect(e) => write!(f, "ConnectError: {}", e),
            ProtocolError::HttpProtocol(e) => write!(f, "HttpProtocolError: {}", e),
            ProtocolError::InvalidUri(e) => write!(f, "InvalidUri: {}", e),
            ProtocolError::InvalidHeader(e) => write!(f, "InvalidHeader: {}", e),
            ProtocolError::Utf8(e) => write!(f, "Utf8Error: {}", e),
            ProtocolError::JsonEncoding(e) => write!(f, "JsonEncodingError: {}", e),
            ProtocolError::Io(e) => write!(f, "IoError: {}", e),
            ProtocolError::Timeout(d) => write!(f, "Request timed out after {:?}", d),
        }
    }
}

/// Everything a caller of [`crate::Client::send`] can observe.
///
/// Authentication recovery is handled inside [`crate::auth::RequestGateway`];
/// only its terminal outcomes surface here, as [`Error::Unauthenticated`] and
/// [`Error::SessionExpired`].
pub enum Error {
    Custom(String),
    /// Network, timeout, or encoding failure. Never retried by the gateway.
    Protocol(ProtocolError),
    /// The server answered with a 4xx/5xx, surfaced by `error_for_status`.
    HttpError(Response),
    /// No credential was stored and the server demanded one.
    Unauthenticated,
    /// Refresh failed, or the request was rejected again after refreshing.
    SessionExpired,
}

impl Error {
    pub fn custom(msg: &str) -> Self {
        Error::Custom(msg.to_string())
    }

    /// Get the error status code.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError(r) => Some(r.status()),
            Error::Unauthenticated | Error::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired)
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Error::Unauthenticated)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Custom(msg) => write!(f, "Custom: {}", msg),
            Error::Protocol(e) => write!(f, "Protocol: {:?}", e),
            Error::HttpError(r) => {
                write!(
                    f,
                    "HttpError {{ status: {}, headers: {:?}, body: {:?} }}",
                    r.parts.status, r.parts.headers, r.body
                )
            }
            Error::Unauthenticated => write!(f, "Unauthenticated"),
            Error::SessionExpired => write!(f, "SessionExpired"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Custom(msg) => write!(f, "{}", msg),
            Error::Protocol(e) => write!(f, "{}", e),
            Error::HttpError(r) => write!(f, "HttpError: {}", r.parts.status),
            Error::Unauthenticated => write!(f, "Request requires authentication, but no credentials are stored"),
            Error::SessionExpired => write!(f, "Session expired; sign in again"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Error::Protocol(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Protocol(ProtocolError::JsonEncoding(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Protocol(ProtocolError::Io(value))
    }
}

impl From<hyper::Error> for Error {
    fn from(value: hyper::Error) -> Self {
        Error::Protocol(ProtocolError::HttpProtocol(value))
    }
}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Error::Protocol(ProtocolError::Connect(value))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(value: http::uri::InvalidUri) -> Self {
        Error::Protocol(ProtocolError::InvalidUri(value))
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Protocol(ProtocolError::Utf8(value))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(value: http::header::InvalidHeaderValue) -> Self {
        Error::Protocol(ProtocolError::InvalidHeader(value.to_string()))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(value: http::header::InvalidHeaderName) -> Self {
        Error::Protocol(ProtocolError::InvalidHeader(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_report_401() {
        assert_eq!(Error::SessionExpired.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(Error::Unauthenticated.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(Error::custom("x").status(), None);
    }

    #[test]
    fn test_timeout_is_transport() {
        let err: Error = ProtocolError::Timeout(Duration::from_secs(3)).into();
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Request timed out after 3s");
    }
}
