//! CLI-level tests: declaration file in, rendered report out.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use s3keys::cli::Cli;
use s3keys::commands::{build_store, execute_command};
use s3keys::config::KeysFile;
use s3keys::s3keys_store::InMemoryObjectStore;

const DECLARATIONS: &str = r#"
bucket = "app-config"

[[key]]
name = "a"
path = "cfg/a"
value = "v1"

[[key]]
name = "b"
path = "cfg/b"
default = "fallback"

[[key]]
name = "old"
path = "cfg/old"
delete = true
"#;

fn keys_file() -> KeysFile {
    KeysFile::parse(Path::new("s3keys.toml"), DECLARATIONS).unwrap()
}

fn cli(args: &[&str]) -> Cli {
    let argv = std::iter::once("s3keys").chain(args.iter().copied());
    Cli::try_parse_from(argv).unwrap()
}

async fn run(args: &[&str], store: Arc<InMemoryObjectStore>) -> Value {
    let output = execute_command(&cli(args), &keys_file(), store)
        .await
        .unwrap();
    serde_json::from_str(&output).unwrap()
}

#[tokio::test]
async fn test_apply_prints_vars() {
    let store = InMemoryObjectStore::new_arc();

    let report = run(&["apply"], store.clone()).await;

    assert_eq!(report["intent"], "apply");
    assert_eq!(report["bucket"], "app-config");
    assert_eq!(report["vars"]["a"], "v1");
    assert_eq!(report["vars"]["b"], "");
    assert!(report.get("declarations").is_none());
    assert!(store.object("app-config", "cfg/a").await.is_some());
}

#[tokio::test]
async fn test_refresh_falls_back_to_defaults() {
    let store = InMemoryObjectStore::new_arc();
    store.insert("app-config", "cfg/a", "remote\n").await;

    let report = run(&["refresh", "--declarations"], store).await;

    assert_eq!(report["vars"]["a"], "remote");
    assert_eq!(report["vars"]["b"], "fallback");
    assert_eq!(report["declarations"][1]["value"], "fallback");
}

#[tokio::test]
async fn test_delete_single_key() {
    let store = InMemoryObjectStore::new_arc();
    store.insert("app-config", "cfg/a", "v1").await;

    let report = run(&["delete", "--path", "cfg/a"], store.clone()).await;

    assert_eq!(report["deleted"], "cfg/a");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_destroy_flagged_only() {
    let store = InMemoryObjectStore::new_arc();
    store.insert("app-config", "cfg/a", "v1").await;
    store.insert("app-config", "cfg/old", "stale").await;

    let report = run(&["destroy"], store.clone()).await;

    assert_eq!(report["deleted"], serde_json::json!(["cfg/old"]));
    assert_eq!(report["missing"], serde_json::json!([]));
    assert!(store.object("app-config", "cfg/a").await.is_some());
}

#[tokio::test]
async fn test_destroy_all_reports_missing() {
    let store = InMemoryObjectStore::new_arc();
    store.insert("app-config", "cfg/a", "v1").await;

    let report = run(&["destroy", "--all"], store.clone()).await;

    assert_eq!(report["deleted"], serde_json::json!(["cfg/a"]));
    assert_eq!(report["missing"], serde_json::json!(["cfg/b", "cfg/old"]));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_yaml_output() {
    let output = execute_command(
        &cli(&["--format", "yaml", "apply"]),
        &keys_file(),
        InMemoryObjectStore::new_arc(),
    )
    .await
    .unwrap();

    assert!(output.contains("intent: apply"));
    assert!(output.contains("a: v1"));
}

#[tokio::test]
async fn test_empty_bucket_flag_is_rejected() {
    let store = InMemoryObjectStore::new_arc();
    let result = execute_command(&cli(&["--bucket", "", "apply"]), &keys_file(), store.clone()).await;

    assert!(result.is_err());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_declaration_fails_before_any_write() {
    let file = KeysFile::parse(
        Path::new("s3keys.toml"),
        r#"
bucket = "app-config"

[[key]]
name = "a"
path = "cfg/a"
value = "v1"

[[key]]
path = "cfg/nameless"
"#,
    )
    .unwrap();
    let store = InMemoryObjectStore::new_arc();

    let result = execute_command(&cli(&["apply"]), &file, store.clone()).await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("malformed declaration at index 1"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_apply_against_http_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/app-config/cfg/a"))
        .and(body_string("v1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app-config/cfg/b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app-config/cfg/old"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  kept \n"))
        .expect(1)
        .mount(&server)
        .await;

    let cli = cli(&["--endpoint", &server.uri(), "apply"]);
    let file = keys_file();
    let store = build_store(&cli, &file).unwrap();

    let output = execute_command(&cli, &file, store).await.unwrap();
    let report: Value = serde_json::from_str(&output).unwrap();

    assert_eq!(report["vars"]["a"], "v1");
    assert_eq!(report["vars"]["b"], "");
    assert_eq!(report["vars"]["old"], "kept");
}

#[tokio::test]
async fn test_load_from_disk_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("keys.yaml");
    std::fs::write(
        &config,
        "bucket: app-config\nkey:\n  - name: flag\n    path: cfg/flag\n    default: true\n",
    )
    .unwrap();

    let cli = cli(&["--config", config.to_str().unwrap(), "--memory", "refresh"]);
    let file = KeysFile::load(&cli.config).unwrap();
    let store = build_store(&cli, &file).unwrap();

    let output = execute_command(&cli, &file, store).await.unwrap();
    let report: Value = serde_json::from_str(&output).unwrap();

    assert_eq!(report["vars"]["flag"], "true");
}
