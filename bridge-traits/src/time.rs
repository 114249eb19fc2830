//! Clock and host log forwarding.
//!
//! Sync waves store their boundaries in Unix seconds; the download queue
//! orders rows by Unix milliseconds. Both read the injected [`Clock`], so
//! tests can pin time with [`ManualClock`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Unix seconds, the unit of sync-wave timestamps
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Unix milliseconds, the unit of download queue dates
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn starting_at(timestamp_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(timestamp_millis),
        }
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_millis(&self, timestamp_millis: i64) {
        self.millis.store(timestamp_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One tracing event, flattened for a host console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_sync::library_syncer`
    pub target: String,
    pub message: String,
    /// Structured fields, already redacted; sorted for stable output
    pub fields: BTreeMap<String, String>,
    /// Innermost span, e.g. `sync` or `download`
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn in_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

/// Receives the core's log events, e.g. to show sync progress in a host
/// console or forward it to the platform logger.
///
/// Entries reach the sink after redaction of credential-like fields.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Entries below this level are dropped before they are built.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_units_agree() {
        let clock = SystemClock;
        let seconds = clock.unix_timestamp();
        let millis = clock.unix_timestamp_millis();

        assert!(seconds > 0);
        assert!((millis / 1000 - seconds).abs() <= 1);
    }

    #[test]
    fn test_manual_clock_advances_only_when_told() {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        assert_eq!(clock.unix_timestamp_millis(), 1_700_000_000_000);

        clock.advance_millis(1_500);
        assert_eq!(clock.unix_timestamp(), 1_700_000_001);

        clock.set_millis(5_000);
        assert_eq!(clock.unix_timestamp(), 5);
    }

    #[test]
    fn test_log_entry_fields_are_sorted() {
        let entry = LogEntry::new(LogLevel::Warn, "core_download::manager", "Giving up")
            .with_field("id", "song-42")
            .with_field("attempts", "3")
            .in_span("download");

        let keys: Vec<_> = entry.fields.keys().cloned().collect();
        assert_eq!(keys, vec!["attempts", "id"]);
        assert_eq!(entry.span.as_deref(), Some("download"));
        assert_eq!(entry.level.as_str(), "WARN");
    }
}
