//! Error types for the store crate.

use thiserror::Error;

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a failed object store call.
///
/// The set is closed on purpose: callers branch on `NotFound` versus
/// everything else and never inspect transport status codes themselves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found")]
    NotFound,

    /// Any other failure (permissions, network, malformed request, server error).
    #[error("{reason}")]
    Other { reason: String },
}

impl StoreError {
    /// Create an "other" store error.
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }

    /// Whether this error means the object is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Errors raised while building a store client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("failed to build HTTP client: {reason}")]
    BuildFailed { reason: String },

    #[error("no endpoint configured (set store.endpoint or S3KEYS_ENDPOINT)")]
    MissingEndpoint,
}
