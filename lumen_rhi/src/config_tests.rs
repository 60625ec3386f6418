//! Unit tests for config.rs

use serial_test::serial;
use std::time::Duration;
use crate::config::{
    record_validation_message, reset_validation_stats, validation_stats, Config, DebugSeverity,
    ValidationLevel, ValidationStats,
};

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.enable_validation, cfg!(debug_assertions));
    assert!(config.prefer_low_latency);
    assert_eq!(config.fence_timeout, Duration::from_secs(10));
    assert_eq!(config.fence_timeout_ns(), 10_000_000_000);
    assert_eq!(config.app_version, (1, 0, 0));
}

#[test]
fn test_fence_timeout_saturates() {
    let config = Config { fence_timeout: Duration::MAX, ..Default::default() };
    assert_eq!(config.fence_timeout_ns(), u64::MAX);
}

#[test]
fn test_debug_severity_filter() {
    assert!(DebugSeverity::ErrorsOnly.accepts(ValidationLevel::Error));
    assert!(!DebugSeverity::ErrorsOnly.accepts(ValidationLevel::Warning));
    assert!(DebugSeverity::ErrorsAndWarnings.accepts(ValidationLevel::Warning));
    assert!(!DebugSeverity::ErrorsAndWarnings.accepts(ValidationLevel::Info));
    assert!(DebugSeverity::All.accepts(ValidationLevel::Verbose));
}

#[test]
fn test_stats_total() {
    let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}

#[test]
#[serial]
fn test_stats_record_and_reset() {
    reset_validation_stats();
    record_validation_message(ValidationLevel::Error);
    record_validation_message(ValidationLevel::Warning);
    record_validation_message(ValidationLevel::Warning);

    let stats = validation_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 2);
    assert_eq!(stats.info, 0);

    reset_validation_stats();
    assert_eq!(validation_stats().total(), 0);
}
