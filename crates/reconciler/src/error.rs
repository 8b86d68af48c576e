//! Error types for the reconciler crate.

use s3keys_store::StoreError;
use thiserror::Error;

use crate::types::Operation;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// A missing object during a pull is not an error; it never reaches this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A declaration lacks a required field.
    #[error("malformed declaration at index {index}: {reason}")]
    MalformedDeclaration { index: usize, reason: String },

    /// The store rejected an operation for reasons other than a missing object.
    #[error("failed to {operation} key '{key}' in bucket '{bucket}': {source}")]
    StoreFailed {
        operation: Operation,
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a malformed declaration error.
    pub fn malformed_declaration(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDeclaration {
            index,
            reason: reason.into(),
        }
    }

    /// Create a store failure annotated with bucket and key.
    pub fn store_failed(
        operation: Operation,
        bucket: impl Into<String>,
        key: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::StoreFailed {
            operation,
            bucket: bucket.into(),
            key: key.into(),
            source,
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
