//! Object store trait and implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

/// Content type used for every pushed key body.
pub const TEXT_PLAIN: &str = "text/plain";

/// Whether `key` has a `.` or `..` path segment.
///
/// URL path handling collapses such segments, so these keys cannot be
/// addressed as written.
pub fn has_dot_segment(key: &str) -> bool {
    key.split('/').any(|segment| segment == "." || segment == "..")
}

/// Trait for blob storage backends addressed by bucket and object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` as the object at `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read the object at `key`.
    ///
    /// Returns [`StoreError::NotFound`] when no object exists there.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Delete the object at `key`.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        (**self).put(bucket, key, body, content_type).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        (**self).get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        (**self).delete(bucket, key).await
    }
}

/// An object held by [`InMemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw object body.
    pub body: Vec<u8>,
    /// Content type recorded at write time.
    pub content_type: String,
}

/// In-memory object store for testing and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed an object directly, bypassing the trait.
    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: TEXT_PLAIN.to_string(),
            },
        );
    }

    /// Look up an object without going through the trait.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of objects across all buckets.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.body.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

/// A wrapper that adds tracing to an object store.
pub struct TracingObjectStore<S: ObjectStore> {
    inner: S,
}

impl<S: ObjectStore> TracingObjectStore<S> {
    /// Create a new tracing object store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingObjectStore<S> {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        tracing::debug!(bucket, key, bytes = body.len(), content_type, "Putting object");
        let result = self.inner.put(bucket, key, body, content_type).await;
        if let Err(ref e) = result {
            tracing::trace!(bucket, key, error = %e, "Put failed");
        }
        result
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        tracing::debug!(bucket, key, "Getting object");
        let result = self.inner.get(bucket, key).await;
        match result {
            Ok(ref body) => tracing::trace!(bucket, key, bytes = body.len(), "Object read"),
            Err(ref e) => tracing::trace!(bucket, key, error = %e, "Get failed"),
        }
        result
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        tracing::debug!(bucket, key, "Deleting object");
        self.inner.delete(bucket, key).await
    }
}
