//! Integration tests for logging functionality
//!
//! A global subscriber can be installed once per process, so only
//! `test_file_logging_writes_json_lines` calls `init_logging` successfully.

use ckg_bridge::config::LoggingConfig;
use ckg_bridge::logging::init_logging;
use ckg_bridge::logging::structured::{file_appender, LOG_FILE_PREFIX};
use tempfile::TempDir;

fn local_config(path: &std::path::Path, rotation: &str) -> LoggingConfig {
    LoggingConfig {
        local_enabled: true,
        local_path: path.to_string_lossy().to_string(),
        local_rotation: rotation.to_string(),
    }
}

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_path, "/var/log/ckg-bridge");
    assert_eq!(config.local_rotation, "daily");
}

#[test]
fn test_file_appender_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("nested").join("logs");
    assert!(!log_path.exists());

    for rotation in ["daily", "hourly", "never"] {
        file_appender(&local_config(&log_path, rotation)).unwrap();
    }

    assert!(log_path.is_dir());
}

#[test]
fn test_invalid_level_is_rejected_before_install() {
    let temp_dir = TempDir::new().unwrap();
    let result = init_logging("loud", &local_config(temp_dir.path(), "daily"));
    assert!(result.is_err());
}

#[test]
fn test_file_logging_writes_json_lines() {
    let temp_dir = TempDir::new().unwrap();
    let config = local_config(temp_dir.path(), "never");

    let guard = init_logging("info", &config).expect("Failed to initialize logging");
    assert!(guard.writes_file());
    drop(guard);

    let log_file = temp_dir.path().join(LOG_FILE_PREFIX);
    assert!(log_file.exists());
    if std::env::var("RUST_LOG").is_err() {
        let content = std::fs::read_to_string(&log_file).unwrap();
        let first = content.lines().next().expect("no log line written");
        let line: serde_json::Value = serde_json::from_str(first).unwrap();
        assert_eq!(line["fields"]["message"], "Logging initialized");
        assert_eq!(line["target"], "ckg_bridge::logging::structured");
    }
}
