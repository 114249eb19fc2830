use super::{BackgroundJob, BackgroundWorker, LibrarySyncJob, VersionResyncer, WorkerState};
use crate::artwork_syncer::ArtworkSyncer;
use crate::error::Result;
use crate::library_syncer::LibrarySyncer;
use crate::library_updater::LibraryUpdater;
use crate::version::{LibrarySyncVersion, SyncVersionStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Version-aware background scheduling.
///
/// `start` runs the blocking library updates to completion, then launches
/// either the version resync (when the persisted version is behind) or the
/// incremental sync, each with the artwork sweep alongside.
#[derive(Debug)]
pub struct BackgroundSyncerManager {
    worker: BackgroundWorker,
    syncer: LibrarySyncer,
    artwork: Arc<ArtworkSyncer>,
    updater: LibraryUpdater,
    versions: SyncVersionStore,
}

impl BackgroundSyncerManager {
    pub fn new(
        syncer: LibrarySyncer,
        artwork: ArtworkSyncer,
        updater: LibraryUpdater,
        versions: SyncVersionStore,
    ) -> Self {
        Self {
            worker: BackgroundWorker::new("background-syncer-manager"),
            syncer,
            artwork: Arc::new(artwork),
            updater,
            versions,
        }
    }

    /// Returns whether background jobs were launched.
    ///
    /// # Errors
    ///
    /// Fails when a blocking migration fails; nothing is scheduled then.
    #[instrument(skip_all)]
    pub async fn start(&self) -> Result<bool> {
        if self.worker.state().await != WorkerState::Idle {
            return Ok(false);
        }

        if let Some(report) = self.updater.perform_blocking_library_updates().await? {
            info!(?report, "Blocking library updates applied");
        }

        let version = self.versions.load(&self.syncer.store().reader()).await?;
        let primary: Arc<dyn BackgroundJob> = if version < LibrarySyncVersion::NEWEST {
            info!(%version, newest = %LibrarySyncVersion::NEWEST, "Scheduling version resync");
            Arc::new(VersionResyncer::new(
                self.syncer.clone(),
                self.versions.clone(),
            ))
        } else {
            Arc::new(LibrarySyncJob::new(self.syncer.clone()))
        };

        let artwork: Arc<dyn BackgroundJob> = self.artwork.clone();
        Ok(self.worker.start(vec![primary, artwork]).await)
    }

    pub async fn stop(&self) {
        self.worker.stop().await
    }

    pub async fn stop_and_wait(&self) {
        self.worker.stop_and_wait().await
    }

    pub async fn state(&self) -> WorkerState {
        self.worker.state().await
    }
}
