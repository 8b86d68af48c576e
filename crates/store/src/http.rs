//! HTTP backend for S3-compatible endpoints.
//!
//! Objects are addressed path-style: `{endpoint}/{bucket}/{key}`. Request
//! signing is left to whatever sits in front of the endpoint (a local MinIO,
//! a signing proxy, or a public-read bucket).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result, StoreError};
use crate::store::{ObjectStore, has_dot_segment};

/// Environment variable consulted by [`HttpStoreConfig::from_env`].
pub const ENDPOINT_ENV: &str = "S3KEYS_ENDPOINT";

/// Longest slice of an error response body carried into a [`StoreError`].
const BODY_EXCERPT_LEN: usize = 256;

/// Configuration for [`HttpObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpStoreConfig {
    /// Base URL of the S3-compatible service.
    pub endpoint: Url,

    /// Timeout for a single request.
    #[serde(
        rename = "timeout_secs",
        with = "duration_secs",
        default = "default_timeout"
    )]
    pub timeout: Duration,
}

impl HttpStoreConfig {
    /// Create a config for the given endpoint with the default timeout.
    pub const fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: default_timeout(),
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the endpoint from `S3KEYS_ENDPOINT`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingEndpoint`] when the variable is unset and
    /// [`ClientError::InvalidEndpoint`] when it does not parse as a URL.
    pub fn from_env() -> std::result::Result<Self, ClientError> {
        Self::from_endpoint_var(std::env::var(ENDPOINT_ENV).ok())
    }

    /// Build a config from the raw value of `S3KEYS_ENDPOINT`, if set.
    ///
    /// # Errors
    ///
    /// Same as [`HttpStoreConfig::from_env`].
    pub fn from_endpoint_var(raw: Option<String>) -> std::result::Result<Self, ClientError> {
        let raw = raw.ok_or(ClientError::MissingEndpoint)?;
        let endpoint = raw.parse::<Url>().map_err(|e| ClientError::InvalidEndpoint {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(endpoint))
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Object store backed by an S3-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    config: Arc<HttpStoreConfig>,
    http_client: reqwest::Client,
}

impl HttpObjectStore {
    /// Create a new store client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] for endpoints that cannot
    /// carry a path, and [`ClientError::BuildFailed`] if the HTTP client
    /// cannot be constructed.
    pub fn new(config: HttpStoreConfig) -> std::result::Result<Self, ClientError> {
        if config.endpoint.cannot_be_a_base() {
            return Err(ClientError::InvalidEndpoint {
                url: config.endpoint.to_string(),
                reason: "endpoint cannot carry a path".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::BuildFailed {
                reason: e.to_string(),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    /// Build the path-style URL for an object.
    ///
    /// Keys with `.` or `..` segments are rejected; the URL would name a
    /// different object.
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        if has_dot_segment(key) {
            return Err(StoreError::other(format!(
                "object key contains a dot segment: {key}"
            )));
        }
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::other("endpoint cannot carry a path"))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, bytes = body.len(), "PUT object");

        let response = self
            .http_client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await.map(|_| ())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, "GET object");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(body.to_vec())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, "DELETE object");

        let response = self
            .http_client
            .delete(url)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await.map(|_| ())
    }
}

/// Classify a response: 404 is `NotFound`, other non-2xx is `Other`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
    Err(StoreError::other(format!("HTTP {status}: {}", excerpt.trim())))
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::other(format!("request timed out: {e}"))
    } else {
        StoreError::other(format!("request failed: {e}"))
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
