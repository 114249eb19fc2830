use super::{BackgroundJob, BackgroundWorker, LibrarySyncJob, WorkerState};
use crate::artwork_syncer::ArtworkSyncer;
use crate::library_syncer::LibrarySyncer;
use std::sync::Arc;

/// Artwork sweep plus incremental library sync, without version handling.
#[derive(Debug, Clone)]
pub struct BackgroundSyncer {
    worker: BackgroundWorker,
    library: Arc<LibrarySyncJob>,
    artwork: Arc<ArtworkSyncer>,
}

impl BackgroundSyncer {
    pub fn new(syncer: LibrarySyncer, artwork: ArtworkSyncer) -> Self {
        Self {
            worker: BackgroundWorker::new("background-syncer"),
            library: Arc::new(LibrarySyncJob::new(syncer)),
            artwork: Arc::new(artwork),
        }
    }

    /// Returns whether the jobs were launched.
    pub async fn start(&self) -> bool {
        let artwork: Arc<dyn BackgroundJob> = self.artwork.clone();
        let library: Arc<dyn BackgroundJob> = self.library.clone();
        self.worker.start(vec![artwork, library]).await
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
