//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, parse_level, strip_path, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());
    assert!(config.enable_spans);
}

#[test]
fn test_cli_style_level_parsing() {
    for (name, level) in [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ] {
        assert_eq!(parse_level(name).unwrap(), level);
    }
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/srv/mirror/pending.jsonl"), "pending.jsonl");
}

#[test]
fn test_init_logging_twice_fails() {
    // Only one global subscriber may be installed per process
    let config = LoggingConfig::default().with_format(LogFormat::Compact);
    init_logging(config.clone()).unwrap();

    assert!(init_logging(config).is_err());
}

#[test]
fn test_invalid_filter_rejected() {
    let config = LoggingConfig::default().with_filter("core_sync=[");
    assert!(init_logging(config).is_err());
}
