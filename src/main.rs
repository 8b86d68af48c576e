//! # s3keys
//!
//! Reads a declaration file, reconciles its keys against the configured
//! bucket and prints the resulting report on stdout. Logs go to stderr and
//! are filtered with `RUST_LOG`.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use s3keys::cli::Cli;
use s3keys::commands::{build_store, execute_command};
use s3keys::config::KeysFile;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    debug!(config = %cli.config.display(), "Loading declarations");

    let file = KeysFile::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let store = build_store(&cli, &file)?;

    let report = execute_command(&cli, &file, store).await?;
    println!("{report}");

    info!("Done");
    Ok(())
}

/// Initialize tracing subscriber, writing to stderr.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
