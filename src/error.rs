use std::fmt::{self, Display};
use std::io;

/// Provides `StoreError` and maps to other errors to
/// convert to a `StoreError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum StoreError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    /// The backend could not be reached (refused, unreachable, timed out).
    ConnectionFailed(String),
    /// The backend answered, but reported a failure.
    BackendError {
        status: u16,
        message: String,
    },
    MalformedResponse(String),
    DuplicateName(String),
    NotFound(String),
    /// The entity has not been assigned an id by the backend yet.
    MissingId,
    /// A pending result was dropped before it resolved.
    Invalidated,
    StoreError(String),
}

impl StoreError {
    /// Connectivity-class failures always get the generic "connection failed" message,
    /// whatever the caller registered.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed(_))
    }

    /// Failures reported by the backend itself rather than by our own code.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, StoreError::BackendError { .. })
    }
}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        StoreError::IoError(error)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::JsonError(error)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            StoreError::ConnectionFailed(error.to_string())
        } else if let Some(status) = error.status() {
            StoreError::BackendError {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            StoreError::MalformedResponse(error.to_string())
        } else {
            StoreError::StoreError(error.to_string())
        }
    }
}

impl From<String> for StoreError {
    fn from(error: String) -> Self {
        StoreError::StoreError(error)
    }
}

impl From<&str> for StoreError {
    fn from(error: &str) -> Self {
        StoreError::StoreError(error.to_string())
    }
}

impl std::error::Error for StoreError {}

impl Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::ConnectionFailed(message) => write!(f, "connection failed: {message}"),
            StoreError::BackendError { status, message } => {
                write!(f, "backend error ({status}): {message}")
            }
            StoreError::DuplicateName(name) => write!(f, "name already in use: {name}"),
            StoreError::NotFound(path) => write!(f, "not found: {path}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
