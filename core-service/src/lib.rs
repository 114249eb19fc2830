//! Core service façade and bootstrap helpers.
//!
//! Wires a [`CoreConfig`] and a host's [`RemoteCatalog`] into the library
//! store, the syncers, the background scheduler and the two download queues
//! (songs and artwork). Desktop hosts enable the `desktop-shims` feature and
//! call [`bootstrap_desktop`], which supplies the `bridge-desktop` adapters.

pub mod error;

pub use error::{CoreError, Result};

use core_async::sync::CancellationToken;
use core_download::{
    DownloadManager, DownloadRequestManager, DownloadScope, Downloadable, HttpFetcher,
};
use core_library::db::DatabaseConfig;
use core_library::models::DownloadKind;
use core_library::{LibraryReader, LibraryStore};
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    ArtworkSyncReport, ArtworkSyncer, BackgroundSyncerManager, LibrarySyncVersion, LibrarySyncer,
    LibraryUpdater, RemoteCatalog, SyncSummary, SyncVersionStore,
};
use std::sync::Arc;
use tracing::{info, instrument};

#[cfg(feature = "desktop-shims")]
use std::path::PathBuf;

/// Host-provided pieces the core cannot build itself.
#[derive(Clone)]
pub struct CoreDependencies {
    pub config: CoreConfig,
    pub catalog: Arc<dyn RemoteCatalog>,
}

impl CoreDependencies {
    pub fn new(config: CoreConfig, catalog: Arc<dyn RemoteCatalog>) -> Self {
        Self { config, catalog }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    store: LibraryStore,
    events: EventBus,
    versions: SyncVersionStore,
    syncer: LibrarySyncer,
    artwork: ArtworkSyncer,
    background: Arc<BackgroundSyncerManager>,
    songs: DownloadManager,
    artwork_downloads: DownloadManager,
}

impl CoreService {
    /// Open the library store and wire every component. Nothing runs until
    /// [`start`](Self::start) or an explicit sync call.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened or migrated.
    #[instrument(skip_all)]
    pub async fn bootstrap(deps: CoreDependencies) -> Result<Self> {
        let CoreDependencies { config, catalog } = deps;
        let events = EventBus::new(config.event_buffer_size);

        let database = match &config.database {
            DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let store = LibraryStore::open(database).await?.with_events(events.clone());
        let versions = SyncVersionStore::new(config.settings_store.clone());
        // An empty store is stamped with the newest version before the first
        // sync can add data.
        let version = versions.load(&store.reader()).await?;

        let syncer = LibrarySyncer::new(
            store.clone(),
            catalog.clone(),
            config.sync.clone(),
            events.clone(),
        );
        let artwork = ArtworkSyncer::new(store.clone(), catalog.clone(), &config.sync, events.clone());
        let updater = LibraryUpdater::new(
            store.clone(),
            catalog.artwork_url_parser(),
            versions.clone(),
        );
        let background = BackgroundSyncerManager::new(
            syncer.clone(),
            artwork.clone(),
            updater,
            versions.clone(),
        );

        let fetcher = Arc::new(HttpFetcher::new(config.http_client.clone()));
        let songs = DownloadManager::new(
            DownloadRequestManager::new(
                store.clone(),
                DownloadScope::Kind(DownloadKind::Song),
                events.clone(),
            ),
            fetcher.clone(),
            &config.download,
        );
        let artwork_downloads = DownloadManager::new(
            DownloadRequestManager::new(
                store.clone(),
                DownloadScope::Kind(DownloadKind::Artwork),
                events.clone(),
            ),
            fetcher,
            &config.download,
        );

        info!(database = ?config.database, %version, "Core service ready");
        Ok(Self {
            store,
            events,
            versions,
            syncer,
            artwork,
            background: Arc::new(background),
            songs,
            artwork_downloads,
        })
    }

    pub fn library(&self) -> LibraryReader {
        self.store.reader()
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> core_async::sync::broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn syncer(&self) -> &LibrarySyncer {
        &self.syncer
    }

    pub fn song_downloads(&self) -> &DownloadManager {
        &self.songs
    }

    pub fn artwork_downloads(&self) -> &DownloadManager {
        &self.artwork_downloads
    }

    /// The persisted sync version, inferred and stored on first use.
    pub async fn sync_version(&self) -> Result<LibrarySyncVersion> {
        Ok(self.versions.load(&self.store.reader()).await?)
    }

    /// Start background sync (after blocking migrations) and both download
    /// workers.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        self.background.start().await?;
        self.songs.start().await?;
        self.artwork_downloads.start().await?;
        Ok(())
    }

    /// Stop every worker, cancel foreground syncs, and wait for in-flight
    /// work to commit.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.background.stop_and_wait().await;
        self.syncer.stop_and_wait().await;
        self.artwork.stop_and_wait().await;
        self.songs.stop_and_wait().await;
        self.artwork_downloads.stop_and_wait().await;
        info!("Core service stopped");
    }

    /// Full foreground sync, e.g. after the user switched servers.
    pub async fn sync_library(&self, token: &CancellationToken) -> Result<SyncSummary> {
        Ok(self.syncer.sync(token).await?)
    }

    pub async fn sync_artwork(&self, token: &CancellationToken) -> Result<ArtworkSyncReport> {
        Ok(self.artwork.sync(token).await?)
    }

    /// Queue one song. Returns whether a new request was created.
    pub async fn download_song(&self, song_id: i64) -> Result<bool> {
        let song = self
            .store
            .reader()
            .song(song_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Song",
                id: song_id,
            })?;
        Ok(self.songs.requests().add(&song).await?)
    }

    /// Queue every song of an album. Returns how many requests were created.
    pub async fn download_album(&self, album_id: i64) -> Result<u64> {
        let songs = self.store.reader().songs_of_album(album_id).await?;
        let items: Vec<&dyn Downloadable> = songs.iter().map(|s| s as &dyn Downloadable).collect();
        Ok(self.songs.requests().add_many(&items).await?)
    }

    /// Drop downloaded song files and cached artwork bytes, and forget
    /// finished downloads of both kinds so they can be fetched again.
    #[instrument(skip(self))]
    pub async fn clear_cached_files(&self) -> Result<()> {
        let mut session = self.store.begin().await?;
        let (files, images) = session.clear_cached_files().await?;
        session.save().await?;
        let requests = self.songs.requests().clear_finished_downloads().await?
            + self.artwork_downloads.requests().clear_finished_downloads().await?;
        info!(files, images, requests, "Cleared cached files");
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Bootstrap with the desktop adapters: `library.db` and `settings.db`
/// under `data_dir`, HTTP via `reqwest`.
///
/// ```ignore
/// let core = core_service::bootstrap_desktop(data_dir, Arc::new(catalog)).await?;
/// core.start().await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    data_dir: PathBuf,
    catalog: Arc<dyn RemoteCatalog>,
) -> Result<CoreService> {
    let settings = bridge_desktop::SqliteSettingsStore::new(data_dir.join("settings.db")).await?;
    let http = bridge_desktop::ReqwestHttpClient::new()?;

    let config = CoreConfig::builder()
        .database_path(data_dir.join("library.db"))
        .settings_store(Arc::new(settings))
        .http_client(Arc::new(http))
        .build()?;

    CoreService::bootstrap(CoreDependencies::new(config, catalog)).await
}
