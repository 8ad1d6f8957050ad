//! Configuration file loading and saving

use common::{HidConfig, load_config};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = HidConfig::default();
    config.logging.log_level = "debug".to_string();
    config.session.queue_capacity = 64;
    config.backend.detach_kernel_driver = false;
    config.save(&path).unwrap();

    let loaded = HidConfig::load(Some(path)).unwrap();
    assert_eq!(loaded.logging.log_level, "debug");
    assert_eq!(loaded.session.queue_capacity, 64);
    assert!(!loaded.backend.detach_kernel_driver);
    assert!(loaded.backend.auto_initialize);
}

#[test]
fn test_load_partial_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[session]\ntransfer_poll_interval_ms = 20\nwrite_timeout_ms = 250\n",
    )
    .unwrap();

    let config = load_config(path.to_str().unwrap()).unwrap();
    assert_eq!(config.session.transfer_poll_interval_ms, 20);
    assert_eq!(config.session.write_timeout_ms, 250);
    assert_eq!(config.session.queue_capacity, 30);
    assert_eq!(config.logging.log_level, "info");
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[session]\nqueue_capacity = 0\n").unwrap();

    let err = HidConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("queue_capacity"));
}

#[test]
fn test_load_reports_parse_errors_with_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[session\nqueue_capacity = ").unwrap();

    let err = HidConfig::load(Some(path)).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = HidConfig::load(Some(dir.path().join("absent.toml")));
    assert!(result.is_err());
}
