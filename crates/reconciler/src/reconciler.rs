//! Reconciler implementation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use s3keys_store::{ObjectStore, StoreError, TEXT_PLAIN, has_dot_segment};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{
    Intent, KeyDeclaration, KeyOutcome, Operation, OutputMap, ReconcileResult, TeardownResult,
    TeardownScope, ValueSource,
};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Maximum store operations in flight during one pass. `1` is sequential.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Upper bound on a single store call.
    #[serde(
        rename = "call_timeout_secs",
        with = "duration_secs",
        default = "default_call_timeout"
    )]
    pub call_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl ReconcilerConfig {
    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero concurrency limit or a zero
    /// call timeout.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::invalid_config("max_concurrent must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::invalid_config("call_timeout must be non-zero"));
        }
        Ok(())
    }
}

const fn default_max_concurrent() -> usize {
    1
}

const fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

/// A key after its remote operation, before folding into the pass result.
struct ResolvedKey {
    declaration: KeyDeclaration,
    source: ValueSource,
}

/// Reconciles declared keys against objects in a bucket.
pub struct Reconciler {
    /// Remote object store.
    store: Arc<dyn ObjectStore>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(store: Arc<dyn ObjectStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Create a sequential reconciler with default configuration.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, ReconcilerConfig::default())
    }

    /// Push declared values and pull everything else.
    ///
    /// A missing object resolves to the empty string; declared defaults are
    /// not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDeclaration`] before any remote call if a
    /// declaration lacks a name or path, and [`Error::StoreFailed`] for the
    /// first store failure other than a missing object.
    pub async fn apply(
        &self,
        bucket: &str,
        declarations: Vec<KeyDeclaration>,
    ) -> Result<ReconcileResult> {
        self.reconcile(Intent::Apply, bucket, declarations).await
    }

    /// Pull every key, never writing.
    ///
    /// A missing object resolves to the declared default, or the empty string.
    ///
    /// # Errors
    ///
    /// Same as [`Reconciler::apply`].
    pub async fn refresh(
        &self,
        bucket: &str,
        declarations: Vec<KeyDeclaration>,
    ) -> Result<ReconcileResult> {
        self.reconcile(Intent::Refresh, bucket, declarations).await
    }

    /// Delete the single object at `path`.
    ///
    /// A missing object counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreFailed`] for any other store failure.
    pub async fn delete_key(&self, bucket: &str, path: &str) -> Result<()> {
        check_target(bucket, path)?;
        self.remove(bucket, path).await.map(|_| ())
    }

    /// Delete the objects of the declarations selected by `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDeclaration`] before any remote call if a
    /// declaration lacks a name or path, and [`Error::StoreFailed`] for the
    /// first store failure other than a missing object.
    pub async fn destroy(
        &self,
        bucket: &str,
        declarations: &[KeyDeclaration],
        scope: TeardownScope,
    ) -> Result<TeardownResult> {
        check_bucket(bucket)?;
        validate_all(declarations)?;

        let targets = declarations
            .iter()
            .filter(|decl| scope == TeardownScope::All || decl.delete);

        let mut result = TeardownResult::default();
        for decl in targets {
            if self.remove(bucket, &decl.path).await? {
                result.deleted.push(decl.path.clone());
            } else {
                result.missing.push(decl.path.clone());
            }
        }

        info!(
            bucket,
            deleted = result.deleted.len(),
            missing = result.missing.len(),
            "Teardown complete"
        );
        Ok(result)
    }

    /// Run one pass over all declarations.
    async fn reconcile(
        &self,
        intent: Intent,
        bucket: &str,
        declarations: Vec<KeyDeclaration>,
    ) -> Result<ReconcileResult> {
        check_bucket(bucket)?;
        validate_all(&declarations)?;

        info!(
            %intent,
            bucket,
            keys = declarations.len(),
            max_concurrent = self.config.max_concurrent,
            "Starting reconciliation"
        );

        let total = declarations.len();
        let aborted = AtomicBool::new(false);
        let aborted = &aborted;

        // No new operations start once one has failed; those in flight finish.
        let resolved: Vec<Option<Result<ResolvedKey>>> = stream::iter(declarations)
            .map(|decl| async move {
                if aborted.load(Ordering::Acquire) {
                    debug!(key = %decl.path, "Skipping key after earlier failure");
                    return None;
                }
                let outcome = self.reconcile_key(intent, bucket, decl).await;
                if outcome.is_err() {
                    aborted.store(true, Ordering::Release);
                }
                Some(outcome)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut updated = Vec::with_capacity(total);
        let mut vars = OutputMap::new();
        let mut outcomes = Vec::with_capacity(total);

        for entry in resolved.into_iter().flatten() {
            let ResolvedKey {
                declaration,
                source,
            } = entry?;
            let value = declaration.value.clone().unwrap_or_default();
            vars.insert(declaration.name.clone(), value);
            outcomes.push(KeyOutcome {
                name: declaration.name.clone(),
                source,
            });
            updated.push(declaration);
        }

        let result = ReconcileResult {
            intent,
            declarations: updated,
            vars,
            outcomes,
        };

        info!(
            %intent,
            bucket,
            pushed = result.count(ValueSource::Pushed),
            pulled = result.count(ValueSource::Pulled),
            missing = result.count(ValueSource::Missing),
            defaulted = result.count(ValueSource::Defaulted),
            "Reconciliation complete"
        );

        Ok(result)
    }

    /// Decide, perform and classify the remote operation for one key.
    async fn reconcile_key(
        &self,
        intent: Intent,
        bucket: &str,
        decl: KeyDeclaration,
    ) -> Result<ResolvedKey> {
        let (value, source) = match (intent, decl.desired_value()) {
            (Intent::Apply, Some(desired)) => {
                let desired = desired.to_string();
                self.push(bucket, &decl.path, &desired).await?;
                (desired, ValueSource::Pushed)
            }
            (Intent::Apply, None) => match self.pull(bucket, &decl.path).await? {
                Some(remote) => (remote, ValueSource::Pulled),
                None => {
                    warn!(bucket, key = %decl.path, "Object not found; resolving to empty value");
                    (String::new(), ValueSource::Missing)
                }
            },
            (Intent::Refresh, _) => match self.pull(bucket, &decl.path).await? {
                Some(remote) => (remote, ValueSource::Pulled),
                None => {
                    warn!(bucket, key = %decl.path, "Object not found; resolving to default");
                    (decl.default_string(), ValueSource::Defaulted)
                }
            },
        };

        Ok(ResolvedKey {
            declaration: decl.resolve(value),
            source,
        })
    }

    async fn push(&self, bucket: &str, key: &str, value: &str) -> Result<()> {
        debug!(bucket, key, "Pushing value");
        self.call(
            self.store
                .put(bucket, key, value.as_bytes().to_vec(), TEXT_PLAIN),
        )
        .await
        .map_err(|e| Error::store_failed(Operation::Put, bucket, key, e))
    }

    /// Read a key; `None` when the object does not exist.
    async fn pull(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        debug!(bucket, key, "Pulling value");
        match self.call(self.store.get(bucket, key)).await {
            Ok(body) => Ok(Some(String::from_utf8_lossy(&body).trim().to_string())),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(Error::store_failed(Operation::Get, bucket, key, e)),
        }
    }

    /// Delete a key; `false` when there was nothing to delete.
    async fn remove(&self, bucket: &str, key: &str) -> Result<bool> {
        debug!(bucket, key, "Deleting object");
        match self.call(self.store.delete(bucket, key)).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound) => {
                warn!(bucket, key, "Object already absent");
                Ok(false)
            }
            Err(e) => Err(Error::store_failed(Operation::Delete, bucket, key, e)),
        }
    }

    /// Bound a store call by the configured timeout.
    async fn call<T>(
        &self,
        operation: impl Future<Output = s3keys_store::Result<T>>,
    ) -> s3keys_store::Result<T> {
        let limit = self.config.call_timeout;
        tokio::time::timeout(limit, operation)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::other(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                )))
            })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

fn check_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::invalid_config("bucket name is empty"));
    }
    Ok(())
}

fn check_target(bucket: &str, path: &str) -> Result<()> {
    check_bucket(bucket)?;
    if path.is_empty() {
        return Err(Error::invalid_config("object path is empty"));
    }
    if has_dot_segment(path) {
        return Err(Error::invalid_config(format!(
            "object path '{path}' contains a dot segment"
        )));
    }
    Ok(())
}

fn validate_all(declarations: &[KeyDeclaration]) -> Result<()> {
    declarations
        .iter()
        .enumerate()
        .try_for_each(|(index, decl)| decl.validate(index))
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the object store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the concurrency limit.
    #[must_use]
    pub const fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no store was given or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("object store is required"))?;
        self.config.validate()?;
        Ok(Reconciler::new(store, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use s3keys_store::InMemoryObjectStore;

    const BUCKET: &str = "app-config";

    fn setup_reconciler() -> (Reconciler, Arc<InMemoryObjectStore>) {
        let store = InMemoryObjectStore::new_arc();
        let reconciler = Reconciler::with_store(store.clone());
        (reconciler, store)
    }

    #[tokio::test]
    async fn test_apply_empty() {
        let (reconciler, _) = setup_reconciler();
        let result = reconciler.apply(BUCKET, Vec::new()).await.unwrap();
        assert!(result.vars.is_empty());
        assert!(result.declarations.is_empty());
    }

    #[tokio::test]
    async fn test_apply_pushes_value_as_text_plain() {
        let (reconciler, store) = setup_reconciler();
        let decls = vec![KeyDeclaration::new("a", "cfg/a").with_value("v1")];

        let result = reconciler.apply(BUCKET, decls).await.unwrap();

        assert_eq!(result.get("a"), Some("v1"));
        assert_eq!(result.outcomes[0].source, ValueSource::Pushed);
        let object = store.object(BUCKET, "cfg/a").await.unwrap();
        assert_eq!(object.body, b"v1".to_vec());
        assert_eq!(object.content_type, TEXT_PLAIN);
    }

    #[tokio::test]
    async fn test_apply_pushes_verbatim() {
        let (reconciler, store) = setup_reconciler();
        let decls = vec![KeyDeclaration::new("a", "cfg/a").with_value(" padded \n")];

        let result = reconciler.apply(BUCKET, decls).await.unwrap();

        assert_eq!(result.get("a"), Some(" padded \n"));
        let object = store.object(BUCKET, "cfg/a").await.unwrap();
        assert_eq!(object.body, b" padded \n".to_vec());
    }

    #[tokio::test]
    async fn test_apply_pull_ignores_default_when_missing() {
        let (reconciler, _) = setup_reconciler();
        let decls = vec![KeyDeclaration::new("b", "cfg/b").with_default("fallback")];

        let result = reconciler.apply(BUCKET, decls).await.unwrap();

        assert_eq!(result.get("b"), Some(""));
        assert_eq!(result.declarations[0].value.as_deref(), Some(""));
        assert_eq!(result.names_from(ValueSource::Missing), vec!["b"]);
    }

    #[tokio::test]
    async fn test_refresh_never_writes() {
        let (reconciler, store) = setup_reconciler();
        let decls = vec![KeyDeclaration::new("a", "cfg/a").with_value("v1")];

        let result = reconciler.refresh(BUCKET, decls).await.unwrap();

        assert!(store.is_empty().await);
        assert_eq!(result.get("a"), Some(""));
        assert_eq!(result.outcomes[0].source, ValueSource::Defaulted);
    }

    #[tokio::test]
    async fn test_refresh_renders_bool_default() {
        let (reconciler, _) = setup_reconciler();
        let decls = vec![KeyDeclaration::new("flag", "cfg/flag").with_default(true)];

        let result = reconciler.refresh(BUCKET, decls).await.unwrap();
        assert_eq!(result.get("flag"), Some("true"));
    }

    #[tokio::test]
    async fn test_pull_trims_body() {
        let (reconciler, store) = setup_reconciler();
        store.insert(BUCKET, "cfg/a", "  hello\n").await;

        let decls = vec![KeyDeclaration::new("a", "cfg/a")];
        let result = reconciler.apply(BUCKET, decls).await.unwrap();
        assert_eq!(result.get("a"), Some("hello"));
    }

    #[tokio::test]
    async fn test_malformed_declaration_fails_before_any_call() {
        let (reconciler, store) = setup_reconciler();
        let decls = vec![
            KeyDeclaration::new("a", "cfg/a").with_value("v1"),
            KeyDeclaration::new("b", ""),
        ];

        let result = reconciler.apply(BUCKET, decls).await;

        assert!(matches!(
            result,
            Err(Error::MalformedDeclaration { index: 1, .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_bucket_is_invalid() {
        let (reconciler, _) = setup_reconciler();
        let result = reconciler.refresh("", Vec::new()).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_delete_key_removes_one_object() {
        let (reconciler, store) = setup_reconciler();
        store.insert(BUCKET, "cfg/a", "1").await;
        store.insert(BUCKET, "cfg/b", "2").await;

        reconciler.delete_key(BUCKET, "cfg/a").await.unwrap();

        assert!(store.object(BUCKET, "cfg/a").await.is_none());
        assert!(store.object(BUCKET, "cfg/b").await.is_some());
    }

    #[tokio::test]
    async fn test_delete_key_tolerates_missing() {
        let (reconciler, _) = setup_reconciler();
        assert!(reconciler.delete_key(BUCKET, "cfg/none").await.is_ok());
    }

    #[tokio::test]
    async fn test_dot_segment_paths_never_reach_store() {
        let (reconciler, store) = setup_reconciler();
        store.insert(BUCKET, "secret", "keep").await;

        let decls = vec![
            KeyDeclaration::new("a", "cfg/a").with_value("v1"),
            KeyDeclaration::new("b", "cfg/../secret").with_value("overwrite"),
        ];
        let result = reconciler.apply(BUCKET, decls).await;
        assert!(matches!(
            result,
            Err(Error::MalformedDeclaration { index: 1, .. })
        ));

        let result = reconciler.delete_key(BUCKET, "./secret").await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        assert!(store.object(BUCKET, "cfg/a").await.is_none());
        assert_eq!(
            store.object(BUCKET, "secret").await.map(|o| o.body),
            Some(b"keep".to_vec())
        );
    }

    #[tokio::test]
    async fn test_destroy_flagged_only() {
        let (reconciler, store) = setup_reconciler();
        store.insert(BUCKET, "cfg/a", "1").await;
        store.insert(BUCKET, "cfg/b", "2").await;
        let decls = vec![
            KeyDeclaration::new("a", "cfg/a").marked_for_delete(),
            KeyDeclaration::new("b", "cfg/b"),
            KeyDeclaration::new("c", "cfg/c").marked_for_delete(),
        ];

        let result = reconciler
            .destroy(BUCKET, &decls, TeardownScope::Flagged)
            .await
            .unwrap();

        assert_eq!(result.deleted, vec!["cfg/a".to_string()]);
        assert_eq!(result.missing, vec!["cfg/c".to_string()]);
        assert!(store.object(BUCKET, "cfg/b").await.is_some());
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let (reconciler, store) = setup_reconciler();
        store.insert(BUCKET, "cfg/a", "1").await;
        store.insert(BUCKET, "cfg/b", "2").await;
        let decls = vec![
            KeyDeclaration::new("a", "cfg/a"),
            KeyDeclaration::new("b", "cfg/b"),
        ];

        let result = reconciler
            .destroy(BUCKET, &decls, TeardownScope::All)
            .await
            .unwrap();

        assert_eq!(result.deleted.len(), 2);
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_builder() {
        let result = ReconcilerBuilder::new()
            .with_store(InMemoryObjectStore::new_arc())
            .max_concurrent(5)
            .call_timeout(Duration::from_secs(2))
            .build();

        assert!(result.is_ok());
        let reconciler = result.ok();
        assert_eq!(
            reconciler.as_ref().map(|r| r.config().max_concurrent),
            Some(5)
        );
        assert_eq!(
            reconciler.map(|r| r.config().call_timeout),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_builder_requires_store() {
        let result = ReconcilerBuilder::new().build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = ReconcilerBuilder::new()
            .with_store(InMemoryObjectStore::new_arc())
            .max_concurrent(0)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_config_defaults_from_empty_document() {
        let config: ReconcilerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReconcilerConfig::default());
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }
}
