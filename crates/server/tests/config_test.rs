//! # Configuration Loading Tests
//!
//! These tests touch process environment variables, so they run serially.

use axiant_server::config::{get_config, ConfigError, TASK_CLAIM_ANALYSIS, TASK_FACT_VERDICT};
use serial_test::serial;
use std::{env, fs};
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, content: &str) -> String {
    let path = dir.path().join("config.yml");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
#[serial]
fn test_defaults_fill_missing_sections() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "jwt_secret: \"s3cret\"\n");

    let config = get_config(Some(&path)).unwrap();

    assert_eq!(config.port, 3001);
    assert_eq!(config.embedded_db_path, "chat_cache.sqlite");
    assert_eq!(config.request_timeout_secs, 5);
    assert!(config.sync_on_startup);
    assert!(config.durable_store().is_none());
    assert!(config.providers.is_empty());
    for task in [TASK_FACT_VERDICT, TASK_CLAIM_ANALYSIS] {
        let task = &config.tasks[task];
        assert_eq!(task.provider.as_deref(), Some("default"));
        assert!(task.system_prompt.as_deref().is_some_and(|p| !p.is_empty()));
    }
}

#[test]
#[serial]
fn test_placeholders_and_prefixed_overrides() {
    // --- 1. Arrange ---
    env::set_var("AXIANT_TEST_GNEWS_KEY", "gnews-from-env");
    env::set_var("AXIANT_DURABLE__URI", "mongodb://localhost:27017/axiant_test");
    env::set_var("AXIANT_REQUEST_TIMEOUT_SECS", "9");
    let dir = tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
jwt_secret: "s3cret"
fact_sources:
  gnews:
    api_key: "${AXIANT_TEST_GNEWS_KEY}"
durable:
  uri: ""
  database: "analytics"
providers:
  default:
    provider: "local"
    api_url: "http://localhost:8080/v1/chat/completions"
    model_name: "llama"
"#,
    );

    // --- 2. Act ---
    let result = get_config(Some(&path));
    env::remove_var("AXIANT_TEST_GNEWS_KEY");
    env::remove_var("AXIANT_DURABLE__URI");
    env::remove_var("AXIANT_REQUEST_TIMEOUT_SECS");
    let config = result.unwrap();

    // --- 3. Assert ---
    assert_eq!(
        config.fact_sources.gnews.api_key.as_deref(),
        Some("gnews-from-env")
    );
    assert_eq!(config.request_timeout_secs, 9);
    let durable = config.durable_store().expect("durable store configured from env");
    assert_eq!(
        durable.uri.as_deref(),
        Some("mongodb://localhost:27017/axiant_test")
    );
    assert_eq!(durable.database, "analytics");
    assert_eq!(config.providers["default"].model_name, "llama");
}

#[test]
#[serial]
fn test_blank_jwt_secret_falls_back() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "jwt_secret: \"${AXIANT_TEST_UNSET_SECRET}\"\n");

    let config = get_config(Some(&path)).unwrap();

    assert!(!config.jwt_secret.is_empty());
}

#[test]
#[serial]
fn test_missing_config_file_is_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.yml");

    let result = get_config(Some(path.to_string_lossy().as_ref()));

    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}
