use super::BackgroundJob;
use crate::artwork_syncer::ArtworkSyncer;
use crate::error::Result;
use crate::library_syncer::{IncrementalOutcome, LibrarySyncer};
use crate::version::{LibrarySyncVersion, SyncVersionStore};
use async_trait::async_trait;
use core_async::sync::CancellationToken;
use core_library::models::WaveKind;
use tracing::{debug, info};

/// Incremental library sync.
#[derive(Debug, Clone)]
pub struct LibrarySyncJob {
    syncer: LibrarySyncer,
}

impl LibrarySyncJob {
    pub fn new(syncer: LibrarySyncer) -> Self {
        Self { syncer }
    }
}

#[async_trait]
impl BackgroundJob for LibrarySyncJob {
    fn name(&self) -> &'static str {
        "library-sync"
    }

    fn is_active(&self) -> bool {
        self.syncer.is_active()
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        match self.syncer.sync_in_background(&token).await? {
            IncrementalOutcome::NotInitialized => {
                debug!("Library never synced; background sync has nothing to do")
            }
            outcome => debug!(?outcome, "Incremental sync finished"),
        }
        Ok(())
    }
}

/// Full catalog refresh after a sync-version bump.
///
/// Drives a `version_resync` wave to `Done` (resuming an unfinished one) and
/// only then raises the persisted version to the newest.
#[derive(Debug, Clone)]
pub struct VersionResyncer {
    syncer: LibrarySyncer,
    versions: SyncVersionStore,
}

impl VersionResyncer {
    pub fn new(syncer: LibrarySyncer, versions: SyncVersionStore) -> Self {
        Self { syncer, versions }
    }
}

#[async_trait]
impl BackgroundJob for VersionResyncer {
    fn name(&self) -> &'static str {
        "version-resync"
    }

    fn is_active(&self) -> bool {
        self.syncer.is_active()
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        let latest = self
            .syncer
            .store()
            .reader()
            .latest_wave(WaveKind::VersionResync)
            .await?;

        let mut wave = match latest {
            Some(wave) if !wave.is_done() => wave,
            _ => {
                let metadata = self.syncer.catalog().library_metadata().await?;
                self.syncer
                    .create_wave(WaveKind::VersionResync, &metadata, None)
                    .await?
            }
        };

        self.syncer.resync(&mut wave, &token).await?;
        self.versions.set(LibrarySyncVersion::NEWEST).await?;
        info!(wave_id = wave.id, "Catalog resynced for the newest sync version");
        Ok(())
    }
}

#[async_trait]
impl BackgroundJob for ArtworkSyncer {
    fn name(&self) -> &'static str {
        "artwork-sync"
    }

    fn is_active(&self) -> bool {
        ArtworkSyncer::is_active(self)
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        self.sync(&token).await.map(|_| ())
    }
}
