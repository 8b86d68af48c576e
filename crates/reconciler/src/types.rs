//! Core types for the reconciler.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use s3keys_store::has_dot_segment;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Resolved values keyed by declaration name.
pub type OutputMap = BTreeMap<String, String>;

/// Fallback for a key whose object is missing during a refresh.
///
/// Declaration files may give a string, a boolean or a number. Non-string
/// defaults render the way they are written, so `8080` becomes `"8080"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean default, rendered as `"true"` or `"false"`.
    Flag(bool),
    /// Integer default.
    Integer(i64),
    /// Floating-point default.
    Float(f64),
    /// String default, used verbatim.
    Text(String),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Float(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<i64> for DefaultValue {
    fn from(number: i64) -> Self {
        Self::Integer(number)
    }
}

impl From<&str> for DefaultValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A declaration as it arrives from a declaration source, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawKeyDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub delete: bool,
}

impl RawKeyDeclaration {
    /// Validate into a typed declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDeclaration`] if `name` or `path` is missing
    /// or empty, or if `path` has a `.` or `..` segment.
    pub fn into_declaration(self, index: usize) -> Result<KeyDeclaration> {
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::malformed_declaration(index, "missing 'name'"))?;
        let path = self.path.filter(|path| !path.is_empty()).ok_or_else(|| {
            Error::malformed_declaration(index, format!("missing 'path' for key '{name}'"))
        })?;

        let declaration = KeyDeclaration {
            name,
            path,
            value: self.value,
            default: self.default,
            delete: self.delete,
        };
        declaration.validate(index)?;
        Ok(declaration)
    }
}

/// Validate a whole list of raw declarations, failing on the first bad entry.
///
/// # Errors
///
/// Returns [`Error::MalformedDeclaration`] for the first invalid entry.
pub fn parse_declarations(raw: Vec<RawKeyDeclaration>) -> Result<Vec<KeyDeclaration>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_declaration(index))
        .collect()
}

/// One named key: where it lives remotely and what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDeclaration {
    /// Identifier in the output map.
    pub name: String,
    /// Object key inside the bucket.
    pub path: String,
    /// Desired value before a pass; resolved value after one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Fallback used by refresh when the object is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Whether teardown should remove this key's object.
    #[serde(default)]
    pub delete: bool,
}

impl KeyDeclaration {
    /// Create a pull declaration with no value or default.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            value: None,
            default: None,
            delete: false,
        }
    }

    /// Set the value to push.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the refresh fallback.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark for removal during teardown.
    #[must_use]
    pub const fn marked_for_delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// The value to push, if any. Empty strings mean "pull".
    pub fn desired_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|value| !value.is_empty())
    }

    /// The refresh fallback as a string; empty when none was declared.
    pub fn default_string(&self) -> String {
        self.default
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDeclaration`] if `name` or `path` is empty,
    /// or if `path` has a `.` or `..` segment.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::malformed_declaration(index, "missing 'name'"));
        }
        if self.path.is_empty() {
            return Err(Error::malformed_declaration(
                index,
                format!("missing 'path' for key '{}'", self.name),
            ));
        }
        if has_dot_segment(&self.path) {
            return Err(Error::malformed_declaration(
                index,
                format!(
                    "path '{}' for key '{}' contains a dot segment",
                    self.path, self.name
                ),
            ));
        }
        Ok(())
    }

    /// Replace the value with the resolved one.
    pub(crate) fn resolve(mut self, value: String) -> Self {
        self.value = Some(value);
        self
    }
}

/// Which pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Push declared values, pull the rest.
    Apply,
    /// Pull everything; never write.
    Refresh,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Remote operation, used to annotate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Put,
    Get,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Get => write!(f, "get"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Where a key's resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// The declared value was written to the store.
    Pushed,
    /// The object body was read from the store.
    Pulled,
    /// The object was missing; resolved to the empty string.
    Missing,
    /// The object was missing; resolved to the declared default.
    Defaulted,
}

/// Per-key record of how a pass resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOutcome {
    pub name: String,
    pub source: ValueSource,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// Pass that produced this result.
    pub intent: Intent,
    /// Declarations with their values resolved, in input order.
    pub declarations: Vec<KeyDeclaration>,
    /// Resolved value per declaration name.
    pub vars: OutputMap,
    /// How each key was resolved, in input order.
    pub outcomes: Vec<KeyOutcome>,
}

impl ReconcileResult {
    /// Names resolved from the given source.
    pub fn names_from(&self, source: ValueSource) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.source == source)
            .map(|outcome| outcome.name.as_str())
            .collect_vec()
    }

    /// Number of keys resolved from the given source.
    pub fn count(&self, source: ValueSource) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.source == source)
            .count()
    }

    /// Look up a resolved value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Which declarations a teardown removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownScope {
    /// Only declarations with `delete = true`.
    #[default]
    Flagged,
    /// Every declaration.
    All,
}

/// Result of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownResult {
    /// Paths whose objects were removed.
    pub deleted: Vec<String>,
    /// Paths that had no object to remove.
    pub missing: Vec<String>,
}
