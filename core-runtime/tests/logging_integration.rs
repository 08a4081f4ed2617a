//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// Global subscriber can only be installed once per process, so a single test
// covers initialization.
#[test]
fn test_init_logging_mirrors_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(target: "core_playback", track = "hussary:2", "Track started");
    tracing::trace!(target: "core_playback", "Filtered out below debug");
    tracing::info!(target: "sqlx::query", "Dependency noise below warn");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Track started");
        assert_eq!(entries[0].fields.get("track"), Some(&"hussary:2".to_string()));
    }

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());
}

#[test]
fn test_redaction_of_sensitive_fields() {
    assert_eq!(redact_if_sensitive("access_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "my_password"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Cookie", "session=1"), "[REDACTED]");

    let redacted = redact_if_sensitive("contact", "listener@example.com");
    assert!(redacted.starts_with('l'));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_redaction_passes_domain_values() {
    assert_eq!(redact_if_sensitive("track", "minshawi:114"), "minshawi:114");
    assert_eq!(redact_if_sensitive("reciter", "sudais"), "sudais");
    assert_eq!(redact_if_sensitive("percent", "42"), "42");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/data/qariee/audio/sudais/036.mp3"), "036.mp3");
    assert_eq!(strip_path("D:\\qariee\\audio\\sudais\\036.mp3"), "036.mp3");
    assert_eq!(strip_path("036.mp3"), "036.mp3");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_filter("core_download=trace")
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert_eq!(config.filter.as_deref(), Some("core_download=trace"));
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
