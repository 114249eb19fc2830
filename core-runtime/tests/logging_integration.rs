//! Integration tests for the logging bootstrap.

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_query, LogFormat, LoggingConfig,
};

#[test]
fn test_credentials_in_catalog_urls_never_reach_logs() {
    let url = "https://music.example.com/server/xml.server.php?action=artists&auth=deadbeef";
    assert_eq!(
        redact_if_sensitive("request_url", url),
        "https://music.example.com/server/xml.server.php"
    );
    assert_eq!(redact_if_sensitive("api_key", "k"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("artist", "Autechre"), "Autechre");
}

#[test]
fn test_strip_query_without_query_is_identity() {
    assert_eq!(strip_query("https://h/a.png"), "https://h/a.png");
}

#[test]
fn test_second_initialization_fails() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    // The first call may lose a race with another test binary-level subscriber,
    // but a second call in the same process must always be rejected.
    let _ = init_logging(config.clone());
    assert!(init_logging(config).is_err());
}
