#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # s3keys
//!
//! Command-line front end for declared configuration keys stored as objects
//! in an S3-compatible bucket. The reconciliation logic lives in
//! `s3keys-reconciler`; this crate loads declaration files, picks the store
//! and renders reports.

pub mod cli;
pub mod commands;
pub mod config;

pub use s3keys_reconciler;
pub use s3keys_store;
