//! Declaration file loading.
//!
//! A declaration file names the bucket, the store endpoint, reconciler
//! tuning, and the list of keys. TOML is the default; `.yaml`/`.yml` and
//! `.json` are picked by extension.

use std::path::{Path, PathBuf};
use std::time::Duration;

use s3keys_reconciler::{KeyDeclaration, RawKeyDeclaration, ReconcilerConfig, parse_declarations};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable naming the bucket when neither flag nor file does.
pub const BUCKET_ENV: &str = "S3KEYS_BUCKET";

/// Errors raised while reading a declaration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    #[error(transparent)]
    Declaration(#[from] s3keys_reconciler::Error),
}

/// Store section of the declaration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Base URL of the S3-compatible service.
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StoreSection {
    /// The configured request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Parsed declaration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeysFile {
    /// Bucket shared by every key.
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Key declarations, as written.
    #[serde(default, rename = "key")]
    pub keys: Vec<RawKeyDeclaration>,
}

impl KeysFile {
    /// Load a declaration file, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadFailed`] if the file cannot be read and
    /// [`ConfigError::ParseFailed`] if it is not valid for its format.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse file content, choosing the format by the path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseFailed`] on malformed content.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let parse_failed = |reason: String| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            reason,
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(content).map_err(|e| parse_failed(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(content).map_err(|e| parse_failed(e.to_string()))
            }
            _ => toml::from_str(content).map_err(|e| parse_failed(e.to_string())),
        }
    }

    /// Validate the raw keys into typed declarations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Declaration`] for the first malformed key.
    pub fn declarations(&self) -> Result<Vec<KeyDeclaration>, ConfigError> {
        Ok(parse_declarations(self.keys.clone())?)
    }
}
