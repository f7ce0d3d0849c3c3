//! Unified error types for fetchonce.
//!
//! Every variant renders with a stable code prefix so that collaborators can
//! match on the kind of failure without parsing free-form messages.

use std::fmt;
use std::sync::Arc;

use tokio_rusqlite::rusqlite;

/// Failure of a single network retrieval.
///
/// Carries a human-readable cause and, when the server answered at all, the
/// response status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub cause: String,
    pub status: Option<u16>,
}

impl FetchError {
    /// A response arrived with a non-success status.
    pub fn status(code: u16) -> Self {
        Self { cause: format!("status {code}"), status: Some(code) }
    }

    /// The request failed before or while receiving the body.
    pub fn transport(cause: impl Into<String>) -> Self {
        Self { cause: cause.into(), status: None }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) if !self.cause.contains(&code.to_string()) => write!(f, "{} (status {code})", self.cause),
            _ => f.write_str(&self.cause),
        }
    }
}

impl std::error::Error for FetchError {}

/// Unified error types for the fetchonce cache engine.
///
/// `Clone` so a single flight outcome can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The backing store could not be opened.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// Writing a fetched payload to the store failed.
    #[error("STORAGE_WRITE: {0}")]
    StorageWrite(String),

    /// Operation attempted after teardown.
    #[error("STORE_CLOSED")]
    StoreClosed,

    /// Network or status failure.
    #[error("FETCH_FAILED: {0}")]
    Fetch(FetchError),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(Arc<tokio_rusqlite::Error>),

    /// Schema setup failed.
    #[error("CACHE_ERROR: schema setup failed: {0}")]
    SchemaFailed(String),

    /// Every waiter detached before the fetch finished.
    #[error("CANCELLED")]
    Cancelled,
}

impl Error {
    /// Stable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Error::StorageWrite(_) => "STORAGE_WRITE",
            Error::StoreClosed => "STORE_CLOSED",
            Error::Fetch(_) => "FETCH_FAILED",
            Error::Database(_) | Error::SchemaFailed(_) => "CACHE_ERROR",
            Error::Cancelled => "CANCELLED",
        }
    }

    /// HTTP status of the underlying fetch failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Fetch(e) => e.status,
            _ => None,
        }
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        Error::Fetch(err)
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreClosed,
            tokio_rusqlite::Error::Close((_, e)) => e.into(),
            _ => Error::StoreClosed,
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreClosed,
            other => Error::Database(Arc::new(other)),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(Arc::new(tokio_rusqlite::Error::Error(err)))
    }
}
