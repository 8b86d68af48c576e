//! Object store seam for s3keys.
//!
//! The reconciler talks to remote storage only through the [`ObjectStore`]
//! trait. Backends provided here:
//!
//! - [`InMemoryObjectStore`] - tests and dry runs
//! - [`HttpObjectStore`] - S3-compatible endpoints, path-style addressing
//! - [`TracingObjectStore`] - decorator that logs every call
//!
//! Every failure is either [`StoreError::NotFound`] or [`StoreError::Other`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod http;
pub mod store;

pub use error::{ClientError, Result, StoreError};
pub use http::{ENDPOINT_ENV, HttpObjectStore, HttpStoreConfig};
pub use store::{
    InMemoryObjectStore, ObjectStore, StoredObject, TEXT_PLAIN, TracingObjectStore, has_dot_segment,
};
