//! # Core Configuration Module
//!
//! Builder-based configuration for the library sync core. `CoreConfig` holds
//! the host bridges and the tunables of the syncers and downloaders; the
//! builder fails fast with actionable messages when something required is
//! missing or out of range.
//!
//! ## Required
//!
//! - database location (`database_path` or `in_memory_database`)
//! - `SettingsStore` (persists the library sync version)
//! - `HttpClient` (media and artwork downloads); defaulted to
//!   `bridge_desktop::ReqwestHttpClient` when the `desktop-shims` feature is on
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PageErrorPolicy, SyncSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/ampsync/library.db")
//!     .settings_store(Arc::new(settings))
//!     .http_client(Arc::new(http))
//!     .sync_settings(SyncSettings {
//!         max_item_count_to_poll_at_once: 250,
//!         ..SyncSettings::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{HttpClient, LoggerSink, SettingsStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the library database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Process-local database, discarded on shutdown
    InMemory,
}

/// What a sync pass does when a page request fails.
///
/// A failed request and a legitimately empty page used to be
/// indistinguishable; `TreatAsExhausted` keeps that behavior for hosts that
/// depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorPolicy {
    /// Stop the pass with the error; the wave keeps its offset and resumes
    /// on the next run.
    #[default]
    Abort,
    /// Log the failure and treat the page as empty, advancing the phase.
    TreatAsExhausted,
}

/// Library/artwork sync tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Page size for artist/album/song listings
    pub max_item_count_to_poll_at_once: u32,
    /// Number of `NotChecked` artwork rows pulled per artwork-sync batch
    pub artwork_batch_size: u32,
    pub page_error_policy: PageErrorPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_item_count_to_poll_at_once: 500,
            artwork_batch_size: 10,
            page_error_policy: PageErrorPolicy::Abort,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5000).contains(&self.max_item_count_to_poll_at_once) {
            return Err(Error::Config(format!(
                "max_item_count_to_poll_at_once must be within 1..=5000, got {}",
                self.max_item_count_to_poll_at_once
            )));
        }
        if !(1..=500).contains(&self.artwork_batch_size) {
            return Err(Error::Config(format!(
                "artwork_batch_size must be within 1..=500, got {}",
                self.artwork_batch_size
            )));
        }
        Ok(())
    }
}

/// Download worker tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Concurrent fetches per download manager
    pub max_concurrent: u32,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// How long an idle worker sleeps before polling the queue again
    pub poll_interval_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_attempts: 3,
            initial_backoff_ms: 500,
            poll_interval_ms: 2000,
        }
    }
}

impl DownloadSettings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.max_concurrent) {
            return Err(Error::Config(format!(
                "max_concurrent must be within 1..=16, got {}",
                self.max_concurrent
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Core configuration. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub database: DatabaseLocation,
    pub settings_store: Arc<dyn SettingsStore>,
    pub http_client: Arc<dyn HttpClient>,
    /// Host log pipeline; `None` logs to stdout only
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub sync: SyncSettings,
    pub download: DownloadSettings,
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database", &self.database)
            .field("logger_sink", &self.logger_sink.is_some())
            .field("sync", &self.sync)
            .field("download", &self.download)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Range checks on every tunable.
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }
        self.sync.validate()?;
        self.download.validate()
    }
}

fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required to persist the library sync version. \
                 Desktop: use bridge_desktop::SqliteSettingsStore. \
                 Apple platforms: inject a UserDefaults-backed store."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Bridge(format!("default HTTP client: {e}")))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for media and artwork downloads. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject a platform-native HTTP adapter."
            .to_string(),
    })
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    sync: Option<SyncSettings>,
    download: Option<DownloadSettings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database file path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/path/to/library.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    pub fn in_memory_database(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn download_settings(mut self, settings: DownloadSettings) -> Self {
        self.download = Some(settings);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a missing database location or an out-of-range
    /// tunable; [`Error::CapabilityMissing`] for a missing bridge.
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory_database() to set it."
                    .to_string(),
            )
        })?;

        let settings_store = self.settings_store.ok_or_else(settings_store_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database,
            settings_store,
            http_client,
            logger_sink: self.logger_sink,
            sync: self.sync.unwrap_or_default(),
            download: self.download.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}
