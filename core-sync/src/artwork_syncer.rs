//! # Artwork Syncer
//!
//! Classifies `NotChecked` artwork rows by fetching their image and comparing
//! it byte for byte with the server's placeholder:
//!
//! - identical → `IsDefaultImage`, no bytes kept
//! - different → `CustomImage`, bytes stored
//! - fetch failed → `FetchError`, the sweep continues
//!
//! Rows are pulled in batches from the store so artwork added by a concurrent
//! sync is picked up by the same sweep.

use crate::control::{RunControl, RunToken};
use crate::error::{Result, SyncError};
use crate::remote::RemoteCatalog;
use bridge_traits::{Clock, SystemClock};
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_async::time::Instant;
use core_library::models::ArtworkStatus;
use core_library::LibraryStore;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtworkSyncReport {
    pub checked: u64,
    pub custom: u64,
    pub default: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct ArtworkSyncer {
    store: LibraryStore,
    catalog: Arc<dyn RemoteCatalog>,
    batch_size: u32,
    events: EventBus,
    clock: Arc<dyn Clock>,
    control: Arc<RunControl>,
}

impl ArtworkSyncer {
    pub fn new(
        store: LibraryStore,
        catalog: Arc<dyn RemoteCatalog>,
        settings: &SyncSettings,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            catalog,
            batch_size: settings.artwork_batch_size.max(1),
            events,
            clock: Arc::new(SystemClock),
            control: RunControl::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Cancel the sweep in flight; it stops before its next batch.
    pub async fn stop(&self) {
        self.control.stop().await;
    }

    pub async fn stop_and_wait(&self) {
        self.control.stop_and_wait().await;
    }

    /// Sweep every `NotChecked` row.
    ///
    /// # Errors
    ///
    /// [`SyncError::DefaultArtworkUnavailable`] when the placeholder cannot be
    /// fetched (nothing is classified), [`SyncError::Interrupted`] on
    /// cancellation (completed batches stay committed).
    #[instrument(skip_all)]
    pub async fn sync(&self, token: &CancellationToken) -> Result<ArtworkSyncReport> {
        let (_active, token) = self.control.begin_run(token).await;
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();

        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
            kind: "artwork".to_string(),
            wave_id: None,
        });

        let result = self.sweep(&run_id, &token).await;
        match &result {
            Ok(report) => {
                info!(
                    checked = report.checked,
                    custom = report.custom,
                    default = report.default,
                    failed = report.failed,
                    "Artwork sync finished"
                );
                self.emit(SyncEvent::Completed {
                    run_id,
                    kind: "artwork".to_string(),
                    wave_id: None,
                    items_processed: report.checked,
                    duration_secs: started.elapsed().as_secs(),
                });
            }
            Err(SyncError::Interrupted { items_processed }) => {
                self.emit(SyncEvent::Cancelled {
                    run_id,
                    items_processed: *items_processed,
                });
            }
            Err(e) => {
                warn!(error = %e, "Artwork sync failed");
                self.emit(SyncEvent::Failed {
                    run_id,
                    message: e.to_string(),
                    items_processed: 0,
                    recoverable: e.is_recoverable(),
                });
            }
        }
        result
    }

    async fn sweep(&self, run_id: &str, token: &RunToken) -> Result<ArtworkSyncReport> {
        let default_url = self.catalog.default_artwork_url();
        let placeholder = self
            .catalog
            .fetch_artwork(&default_url)
            .await
            .map_err(|e| SyncError::DefaultArtworkUnavailable(e.to_string()))?;
        debug!(bytes = placeholder.len(), "Fetched placeholder artwork");

        let reader = self.store.reader();
        let mut report = ArtworkSyncReport::default();

        loop {
            if token.is_cancelled() {
                return Err(SyncError::Interrupted {
                    items_processed: report.checked,
                });
            }

            let batch = reader
                .artworks_with_status(ArtworkStatus::NotChecked, self.batch_size)
                .await?;
            if batch.is_empty() {
                return Ok(report);
            }

            let mut classified = Vec::with_capacity(batch.len());
            for artwork in &batch {
                let (status, bytes) = match self.catalog.fetch_artwork(&artwork.url).await {
                    Ok(bytes) => (classify(&placeholder, &bytes), Some(bytes)),
                    Err(e) => {
                        warn!(artwork_id = artwork.id, error = %e, "Artwork fetch failed");
                        (ArtworkStatus::FetchError, None)
                    }
                };
                classified.push((artwork.id, status, bytes));
            }

            let now = self.clock.unix_timestamp();
            let mut session = self.store.begin().await?;
            for (id, status, bytes) in &classified {
                session
                    .artworks()
                    .set_status(*id, *status, bytes.as_deref(), now)
                    .await?;
                match status {
                    ArtworkStatus::CustomImage => report.custom += 1,
                    ArtworkStatus::IsDefaultImage => report.default += 1,
                    _ => report.failed += 1,
                }
            }
            session.save().await?;
            report.checked += classified.len() as u64;

            self.emit(SyncEvent::Progress {
                run_id: run_id.to_string(),
                phase: "artwork".to_string(),
                items_processed: report.checked,
                offset: report.checked,
            });
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.events.emit(CoreEvent::Sync(event)).ok();
    }
}

fn classify(placeholder: &Bytes, fetched: &Bytes) -> ArtworkStatus {
    if fetched == placeholder {
        ArtworkStatus::IsDefaultImage
    } else {
        ArtworkStatus::CustomImage
    }
}

impl std::fmt::Debug for ArtworkSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtworkSyncer")
            .field("batch_size", &self.batch_size)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
