//! # Host Bridge Traits
//!
//! Capability contracts the library sync core needs from its host.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - async HTTP used by downloaders and remote catalogs
//! - [`SettingsStore`](storage::SettingsStore) - key-value preferences (persisted sync version)
//! - [`Clock`](time::Clock) - time source, injectable for deterministic tests
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! Desktop implementations live in `bridge-desktop`. Hosts that embed the core
//! elsewhere inject their own adapters through `core_runtime::config::CoreConfig`,
//! which fails fast when a required capability is missing.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and keep messages actionable (URL, key,
//! status code).
//!
//! ## Thread Safety
//!
//! Every trait is `Send + Sync`; the core shares adapters across background
//! tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{InMemorySettingsStore, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
