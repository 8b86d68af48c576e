//! Shared test fixtures: a store that can be told to fail or stall per key.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use s3keys_store::{InMemoryObjectStore, ObjectStore, StoreError};

pub const BUCKET: &str = "app-config";

/// In-memory store with per-key failure and latency injection.
#[derive(Default)]
pub struct ScriptedStore {
    inner: InMemoryObjectStore,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation on `key` fails with a non-NotFound error.
    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    /// Every operation on `key` sleeps first.
    pub fn delayed(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn inner(&self) -> &InMemoryObjectStore {
        &self.inner
    }

    /// Number of trait calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn before(&self, key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(key) {
            return Err(StoreError::other("HTTP 403 Forbidden: AccessDenied"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.before(key).await?;
        self.inner.put(bucket, key, body, content_type).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.before(key).await?;
        self.inner.get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.before(key).await?;
        self.inner.delete(bucket, key).await
    }
}
