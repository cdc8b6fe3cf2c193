/// Unified error types for roster-sync
use serde::Serialize;
use thiserror::Error;

/// Main error type for the sync pipeline
///
/// Every variant carries owned strings so the error is `Clone`; the identity
/// cache keeps a copy of the cause for negative entries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Identity or resource does not exist on the remote side
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient failures (network, timeout, throttling)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Remote management API returned a non-success status
    #[error("Remote API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Failure from an opaque collaborator, classified by its message
    #[error("Remote error: {0}")]
    Remote(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest decoding and consistency errors
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of a failure, shared by retry and caching decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Stable negative result: cacheable, never retried
    NotFound,
    /// Worth another attempt, never cached
    Transient,
    /// Neither retried nor cached
    Permanent,
    /// Caller gave up; not a failure of the operation itself
    Cancelled,
    /// No explicit tag; callers fall back to message matching
    Unclassified,
}

impl SyncError {
    /// Explicit kind carried by the variant itself
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Transient(_) => ErrorKind::Transient,
            SyncError::Api { status, .. } => match *status {
                404 => ErrorKind::NotFound,
                408 | 429 => ErrorKind::Transient,
                s if s >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            SyncError::Validation(_) | SyncError::Config(_) | SyncError::Manifest(_) => {
                ErrorKind::Permanent
            }
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Remote(_) | SyncError::Io(_) | SyncError::Internal(_) => {
                ErrorKind::Unclassified
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(e: serde_yaml::Error) -> Self {
        SyncError::Manifest(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Internal(format!("JSON error: {}", e))
    }
}

impl From<walkdir::Error> for SyncError {
    fn from(e: walkdir::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
