//! Error taxonomy for fetches against the queue backend.
//!
//! Errors are values, not control flow: the cache and the poller surface them
//! through their state bundles and never let them escape into rendering code.
//! `FetchError` is `Clone` so one coalesced result can be handed to every
//! waiter of a shared request.

use thiserror::Error;

/// Errors that can occur while fetching a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status code.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The payload arrived but could not be decoded into the expected shape.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The request was superseded or its owner went away.
    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if this error only signals cancellation.
    ///
    /// Cancelled fetches are discarded silently and never surfaced as `error`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Returns true if the next scheduled attempt may succeed.
    ///
    /// Network failures, server-side (5xx) errors, rate limiting and malformed
    /// payloads are transient. Other 4xx responses will not fix themselves,
    /// but polling still retries them on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Malformed(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Cancelled => false,
        }
    }

    /// Stable label for logs and terminal output.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Status { .. } => "status",
            FetchError::Malformed(_) => "malformed",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Malformed(err.to_string());
        }
        if let Some(status) = err.status() {
            return FetchError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        FetchError::Network(err.to_string())
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
