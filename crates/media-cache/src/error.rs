//! Error types for the media cache

use media_blob_store::StoreError;
use std::fmt;

/// Failure fetching media from the origin
#[derive(Debug)]
pub enum OriginError {
    Http(Box<reqwest::Error>),
    Status { status: u16, url: String },
    InvalidUrl(String),
}

impl fmt::Display for OriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginError::Http(err) => write!(f, "HTTP error: {}", err),
            OriginError::Status { status, url } => {
                write!(f, "Origin returned status {} for {}", status, url)
            }
            OriginError::InvalidUrl(msg) => write!(f, "Invalid origin URL: {}", msg),
        }
    }
}

impl std::error::Error for OriginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OriginError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        OriginError::Http(Box::new(err))
    }
}

/// Errors surfaced to callers of the cache.
///
/// Only origin failures come out of `resolve`; persistence failures are
/// absorbed there and reach callers solely from construction (`Store`).
#[derive(Debug)]
pub enum CacheError {
    InvalidKey(String),
    Origin(OriginError),
    Store(StoreError),
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::InvalidKey(msg) => write!(f, "Invalid media key: {}", msg),
            CacheError::Origin(err) => write!(f, "Origin fetch error: {}", err),
            CacheError::Store(err) => write!(f, "Blob store error: {}", err),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Origin(err) => Some(err),
            CacheError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<OriginError> for CacheError {
    fn from(err: OriginError) -> Self {
        CacheError::Origin(err)
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for CacheError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CacheError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
