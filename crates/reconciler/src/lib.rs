//! Push/pull reconciliation of declared keys against an object store.
//!
//! Each [`KeyDeclaration`] names a key, the object path it lives at, and
//! optionally a value to push and a fallback default.
//!
//! # Passes
//!
//! - **apply** - push declared values, pull the rest; a missing object
//!   resolves to `""`
//! - **refresh** - pull everything; a missing object resolves to the
//!   declared default
//!
//! Both return a [`ReconcileResult`] holding the declarations with their
//! resolved values and the name → value [`OutputMap`].
//!
//! # Teardown
//!
//! [`Reconciler::delete_key`] removes one object;
//! [`Reconciler::destroy`] removes the objects of flagged (or all)
//! declarations.
//!
//! # Example
//!
//! ```ignore
//! use s3keys_reconciler::{KeyDeclaration, ReconcilerBuilder};
//! use s3keys_store::InMemoryObjectStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_store(InMemoryObjectStore::new_arc())
//!         .build()?;
//!
//!     let decls = vec![
//!         KeyDeclaration::new("a", "cfg/a").with_value("v1"),
//!         KeyDeclaration::new("b", "cfg/b").with_default("fallback"),
//!     ];
//!     let result = reconciler.apply("app-config", decls).await?;
//!     assert_eq!(result.get("a"), Some("v1"));
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod reconciler;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use types::{
    DefaultValue, Intent, KeyDeclaration, KeyOutcome, Operation, OutputMap, RawKeyDeclaration,
    ReconcileResult, TeardownResult, TeardownScope, ValueSource, parse_declarations,
};
