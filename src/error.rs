use std::fmt;
use std::sync::Arc;

/// Errors returned by the sensonet library.
///
/// The type is `Clone` because cached results (including failures) are
/// handed to every caller waiting on the same cache entry.
#[derive(Debug, Clone)]
pub enum Error {
    /// The API answered with a non-2xx status.
    Remote { status: u16, body: String },
    /// The API answered 2xx but the body did not match the expected shape.
    Decode { message: String, body: String },
    /// No system or home matched the requested identifier.
    NotFound(String),
    /// The API returned zero homes or systems where one was expected.
    EmptyResult(String),
    Auth(String),
    Http(Arc<reqwest::Error>),
    Json(Arc<serde_json::Error>),
    InvalidHeader(String),
}

impl Error {
    /// HTTP status of a remote failure, if there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            Error::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// `true` when the API itself rejected or garbled the request.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote { .. } | Error::Decode { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Remote { status, body } => {
                if body.is_empty() {
                    write!(f, "API error: unexpected status {}", status)
                } else {
                    write!(f, "API error: unexpected status {}: {}", status, body)
                }
            }
            Error::Decode { message, .. } => write!(f, "Failed to decode API response: {}", message),
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::EmptyResult(what) => write!(f, "Empty result: {}", what),
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::InvalidHeader(msg) => write!(f, "Invalid header value: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err.as_ref()),
            Error::Json(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
