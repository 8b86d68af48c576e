//! Command execution for the s3keys CLI.
//!
//! Each `cmd_*` function runs one subcommand against an already-built
//! reconciler and returns the report to print.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use s3keys_reconciler::{
    Intent, KeyDeclaration, OutputMap, ReconcileResult, Reconciler, ReconcilerBuilder,
    TeardownResult, TeardownScope,
};
use s3keys_store::{
    HttpObjectStore, HttpStoreConfig, InMemoryObjectStore, ObjectStore, TracingObjectStore,
};

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::{BUCKET_ENV, KeysFile};

/// Report printed after `apply` or `refresh`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub intent: Intent,
    pub bucket: String,
    pub vars: OutputMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declarations: Option<Vec<KeyDeclaration>>,
}

impl PassReport {
    fn new(bucket: &str, result: ReconcileResult, with_declarations: bool) -> Self {
        Self {
            intent: result.intent,
            bucket: bucket.to_string(),
            vars: result.vars,
            declarations: with_declarations.then_some(result.declarations),
        }
    }
}

/// Report printed after `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub bucket: String,
    pub deleted: String,
}

/// Report printed after `destroy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestroyReport {
    pub bucket: String,
    #[serde(flatten)]
    pub result: TeardownResult,
}

/// Pick the bucket: flag, then file, then `S3KEYS_BUCKET`.
///
/// # Errors
///
/// Fails when no source names a bucket.
pub fn resolve_bucket(cli: &Cli, file: &KeysFile) -> Result<String> {
    resolve_bucket_with(cli, file, std::env::var(BUCKET_ENV).ok())
}

/// Pick the bucket given the raw value of `S3KEYS_BUCKET`.
///
/// # Errors
///
/// Fails when no source names a bucket.
pub fn resolve_bucket_with(cli: &Cli, file: &KeysFile, env: Option<String>) -> Result<String> {
    match cli.bucket.clone().or_else(|| file.bucket.clone()).or(env) {
        Some(bucket) => Ok(bucket),
        None => bail!(
            "no bucket configured: pass --bucket, set `bucket` in {}, or export {BUCKET_ENV}",
            cli.config.display()
        ),
    }
}

/// Build the object store the CLI talks to, wrapped with tracing.
///
/// # Errors
///
/// Fails when no endpoint is configured or the endpoint is unusable.
pub fn build_store(cli: &Cli, file: &KeysFile) -> Result<Arc<dyn ObjectStore>> {
    if cli.memory {
        debug!("Using in-memory object store");
        return Ok(Arc::new(TracingObjectStore::new(InMemoryObjectStore::new())));
    }

    let config = match cli.endpoint.as_ref().or(file.store.endpoint.as_ref()) {
        Some(endpoint) => HttpStoreConfig::new(endpoint.clone()),
        None => HttpStoreConfig::from_env().context(
            "No store endpoint configured: pass --endpoint, set [store] endpoint, or use --memory",
        )?,
    };
    let config = match file.store.timeout() {
        Some(timeout) => config.timeout(timeout),
        None => config,
    };

    debug!(endpoint = %config.endpoint, "Using HTTP object store");
    let store = HttpObjectStore::new(config).context("Failed to build HTTP object store")?;
    Ok(Arc::new(TracingObjectStore::new(store)))
}

/// Build the reconciler from file settings and CLI overrides.
///
/// # Errors
///
/// Fails when the resulting configuration is invalid.
pub fn build_reconciler(
    cli: &Cli,
    file: &KeysFile,
    store: Arc<dyn ObjectStore>,
) -> Result<Reconciler> {
    let mut config = file.reconciler.clone();
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent = max;
    }
    ReconcilerBuilder::new()
        .with_store(store)
        .with_config(config)
        .build()
        .context("Invalid reconciler configuration")
}

/// Run the parsed command against `store` and return the rendered report.
///
/// # Errors
///
/// Fails on configuration errors, malformed declarations, or store failures.
pub async fn execute_command(
    cli: &Cli,
    file: &KeysFile,
    store: Arc<dyn ObjectStore>,
) -> Result<String> {
    let bucket = resolve_bucket(cli, file)?;
    let reconciler = build_reconciler(cli, file, store)?;

    match &cli.command {
        Commands::Apply { declarations } => {
            cmd_pass(&reconciler, Intent::Apply, &bucket, file, *declarations, cli.format).await
        }
        Commands::Refresh { declarations } => {
            cmd_pass(&reconciler, Intent::Refresh, &bucket, file, *declarations, cli.format).await
        }
        Commands::Delete { path } => cmd_delete(&reconciler, &bucket, path, cli.format).await,
        Commands::Destroy { all } => {
            let scope = if *all {
                TeardownScope::All
            } else {
                TeardownScope::Flagged
            };
            cmd_destroy(&reconciler, &bucket, file, scope, cli.format).await
        }
    }
}

async fn cmd_pass(
    reconciler: &Reconciler,
    intent: Intent,
    bucket: &str,
    file: &KeysFile,
    with_declarations: bool,
    format: OutputFormat,
) -> Result<String> {
    let declarations = file.declarations()?;
    let result = match intent {
        Intent::Apply => reconciler.apply(bucket, declarations).await?,
        Intent::Refresh => reconciler.refresh(bucket, declarations).await?,
    };

    info!(
        bucket,
        intent = %result.intent,
        keys = result.vars.len(),
        "Pass complete"
    );

    render(&PassReport::new(bucket, result, with_declarations), format)
}

async fn cmd_delete(
    reconciler: &Reconciler,
    bucket: &str,
    path: &str,
    format: OutputFormat,
) -> Result<String> {
    reconciler.delete_key(bucket, path).await?;
    render(
        &DeleteReport {
            bucket: bucket.to_string(),
            deleted: path.to_string(),
        },
        format,
    )
}

async fn cmd_destroy(
    reconciler: &Reconciler,
    bucket: &str,
    file: &KeysFile,
    scope: TeardownScope,
    format: OutputFormat,
) -> Result<String> {
    let declarations = file.declarations()?;
    let result = reconciler.destroy(bucket, &declarations, scope).await?;
    render(
        &DestroyReport {
            bucket: bucket.to_string(),
            result,
        },
        format,
    )
}

/// Serialize a report in the requested format.
///
/// # Errors
///
/// Fails if the report cannot be serialized.
pub fn render<T: Serialize>(report: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).context("Failed to serialize report as YAML")
        }
    }
}
