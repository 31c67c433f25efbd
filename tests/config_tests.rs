//! Shipped configuration files and environment-variable layering

use docflow_core::config::{ConfigManager, ConfigurationError};
use docflow_core::models::Lane;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

// environment variables are process-wide
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn shipped_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_shipped_environments_load_and_validate() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    for environment in ["development", "test", "production"] {
        let manager =
            ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), environment)
                .unwrap_or_else(|e| panic!("{environment}: {e}"));
        assert_eq!(manager.environment(), environment);
        assert_eq!(manager.config().recovery.max_retries, 3, "{environment}");
    }
}

#[test]
fn test_test_environment_accelerates_timings() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test").unwrap();
    let config = manager.config();

    assert_eq!(config.recovery.health_check_interval_ms, 100);
    assert!(config.worker.telemetry_interval() < config.recovery.heartbeat_timeout());
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.lanes.concurrency(Lane::Premium), 2);
    // inherited from the base file
    assert_eq!(config.queue.large_file_threshold_bytes, 50 * 1024 * 1024);
}

#[test]
fn test_environment_variables_override_files() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("docflow.toml"),
        "[recovery]\nmax_retries = 4\n\n[lanes.large]\nconcurrency = 1\n",
    )
    .unwrap();

    std::env::set_var("DOCFLOW__RECOVERY__MAX_RETRIES", "7");
    std::env::set_var("DOCFLOW__LANES__LARGE__CONCURRENCY", "3");
    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging");
    std::env::remove_var("DOCFLOW__RECOVERY__MAX_RETRIES");
    std::env::remove_var("DOCFLOW__LANES__LARGE__CONCURRENCY");

    let manager = result.unwrap();
    assert_eq!(manager.config().recovery.max_retries, 7);
    assert_eq!(manager.config().lanes.concurrency(Lane::Large), 3);
}

#[test]
fn test_slow_heartbeats_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("docflow.toml"),
        "[worker]\ntelemetry_interval_ms = 40000\n\n[recovery]\nhealth_check_interval_ms = 10000\n",
    )
    .unwrap();

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();
    match err {
        ConfigurationError::InvalidValue { field, .. } => {
            assert_eq!(field, "worker.telemetry_interval_ms")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("docflow.toml"), "[recovery\nmax_retries = ").unwrap();

    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::LoadFailed { .. }));
}
