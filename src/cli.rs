//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use url::Url;

/// s3keys - declared configuration keys backed by an object store
#[derive(Parser, Debug)]
#[command(name = "s3keys")]
#[command(version)]
#[command(about = "Reconcile declared configuration keys against objects in an S3-compatible bucket")]
#[command(
    long_about = "s3keys reads a declaration file listing named keys and their object paths, pushes declared values, pulls the rest, and prints the resolved name -> value map."
)]
pub struct Cli {
    /// Declaration file (TOML, YAML or JSON)
    #[arg(short, long, default_value = "s3keys.toml")]
    pub config: PathBuf,

    /// Bucket name (overrides the file and S3KEYS_BUCKET)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// S3-compatible endpoint (overrides the file and S3KEYS_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<Url>,

    /// Use an in-memory store instead of the endpoint
    #[arg(long, default_value_t = false)]
    pub memory: bool,

    /// Maximum store operations in flight (overrides the file)
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Push declared values, pull the rest
    Apply {
        /// Also print the updated declarations
        #[arg(long, default_value_t = false)]
        declarations: bool,
    },

    /// Pull every key, falling back to declared defaults
    Refresh {
        /// Also print the updated declarations
        #[arg(long, default_value_t = false)]
        declarations: bool,
    },

    /// Delete a single object
    Delete {
        /// Object path inside the bucket
        #[arg(short, long)]
        path: String,
    },

    /// Delete the objects of declared keys
    Destroy {
        /// Delete every declared key, not only those marked `delete = true`
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

/// How results are printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}
