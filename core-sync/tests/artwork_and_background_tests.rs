//! Artwork classification, the v9 artwork migration and background scheduling.

mod common;

use bridge_traits::InMemorySettingsStore;
use bytes::Bytes;
use common::{
    artwork_url, small_library, CatalogState, MockCatalog, DEFAULT_ARTWORK_URL, PLACEHOLDER,
};
use core_async::sync::CancellationToken;
use core_async::time::{sleep, Duration};
use core_library::models::{ArtworkStatus, DownloadKind, NewArtist, NewDownload, WaveKind};
use core_library::LibraryStore;
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use core_sync::{
    ArtworkSyncer, BackgroundSyncer, BackgroundSyncerManager, LibrarySyncVersion, LibrarySyncer,
    LibraryUpdater, QueryArtworkUrlParser, SyncError, SyncVersionStore, WorkerState,
};
use std::collections::HashSet;
use std::sync::Arc;

fn versions() -> SyncVersionStore {
    SyncVersionStore::new(Arc::new(InMemorySettingsStore::new()))
}

fn artwork_syncer(store: &LibraryStore, catalog: &MockCatalog, batch: u32) -> ArtworkSyncer {
    let settings = SyncSettings {
        artwork_batch_size: batch,
        ..SyncSettings::default()
    };
    ArtworkSyncer::new(
        store.clone(),
        Arc::new(catalog.clone()),
        &settings,
        EventBus::new(64),
    )
}

fn library_syncer(store: &LibraryStore, catalog: &MockCatalog) -> LibrarySyncer {
    LibrarySyncer::new(
        store.clone(),
        Arc::new(catalog.clone()),
        SyncSettings::default(),
        EventBus::new(256),
    )
}

async fn synced_library(state: CatalogState) -> (LibraryStore, MockCatalog) {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let catalog = MockCatalog::new(state);
    library_syncer(&store, &catalog)
        .sync(&CancellationToken::new())
        .await
        .unwrap();
    (store, catalog)
}

async fn wait_until_idle(manager: &BackgroundSyncerManager) {
    for _ in 0..400 {
        if manager.state().await == WorkerState::Idle {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("background work never finished");
}

/// Seeds pre-v9 artwork: rows keyed by URL, with per-session auth tokens.
/// Returns (winner, loser, unparseable) artwork ids.
async fn seed_legacy_artwork(store: &LibraryStore) -> (i64, i64, i64) {
    let mut session = store.begin().await.unwrap();
    let first = session
        .artworks()
        .ensure(&artwork_url("album", "42", "session-a"), None)
        .await
        .unwrap();
    let duplicate = session
        .artworks()
        .ensure(&artwork_url("album", "42", "session-b"), None)
        .await
        .unwrap();
    session
        .artworks()
        .ensure(&artwork_url("artist", "7", "session-a"), None)
        .await
        .unwrap();
    let broken = session
        .artworks()
        .ensure("https://music.test/static/broken.png", None)
        .await
        .unwrap();

    for (remote_id, artwork_id) in [("1", first.id), ("2", duplicate.id), ("3", broken.id)] {
        session
            .artists()
            .upsert(&NewArtist {
                remote_id: remote_id.to_string(),
                name: format!("Artist {remote_id}"),
                artwork_id: Some(artwork_id),
                ..NewArtist::default()
            })
            .await
            .unwrap();
    }

    session
        .downloads()
        .insert_if_absent(&NewDownload {
            id: format!("artwork-{}", duplicate.id),
            kind: DownloadKind::Artwork,
            element_id: duplicate.id,
            url: Some(duplicate.url.clone()),
            creation_date: 1,
        })
        .await
        .unwrap();
    session.save().await.unwrap();

    (first.id, duplicate.id, broken.id)
}

// ============================================================================
// Artwork syncer
// ============================================================================

#[core_async::test]
async fn test_artwork_classification() {
    let mut state = small_library();
    state
        .images
        .insert(DEFAULT_ARTWORK_URL.to_string(), Bytes::from_static(PLACEHOLDER));
    state.images.insert(
        artwork_url("artist", "ar1", "t1"),
        Bytes::from_static(PLACEHOLDER),
    );
    state.images.insert(
        artwork_url("album", "al1", "t1"),
        Bytes::from_static(b"real cover"),
    );
    let (store, catalog) = synced_library(state).await;
    let reader = store.reader();
    assert_eq!(reader.artwork_count().await.unwrap(), 8);

    let report = artwork_syncer(&store, &catalog, 3)
        .sync(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.checked, 8);
    assert_eq!(report.default, 1);
    assert_eq!(report.custom, 1);
    assert_eq!(report.failed, 6);
    assert_eq!(
        reader
            .artwork_status_count(ArtworkStatus::NotChecked)
            .await
            .unwrap(),
        0
    );

    let custom = reader
        .artworks_with_status(ArtworkStatus::CustomImage, 10)
        .await
        .unwrap();
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].image_data.as_deref(), Some(&b"real cover"[..]));

    let default = reader
        .artworks_with_status(ArtworkStatus::IsDefaultImage, 10)
        .await
        .unwrap();
    assert_eq!(default[0].image_data, None);
}

#[core_async::test]
async fn test_artwork_sync_needs_placeholder() {
    let (store, catalog) = synced_library(small_library()).await;

    let err = artwork_syncer(&store, &catalog, 10)
        .sync(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::DefaultArtworkUnavailable(_)));
    assert_eq!(
        store
            .reader()
            .artwork_status_count(ArtworkStatus::NotChecked)
            .await
            .unwrap(),
        8
    );
}

#[core_async::test]
async fn test_cancelled_artwork_sync_checks_nothing() {
    let mut state = small_library();
    state
        .images
        .insert(DEFAULT_ARTWORK_URL.to_string(), Bytes::from_static(PLACEHOLDER));
    let (store, catalog) = synced_library(state).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = artwork_syncer(&store, &catalog, 10)
        .sync(&token)
        .await
        .unwrap_err();

    assert!(err.is_interrupted());
    assert_eq!(
        store
            .reader()
            .artwork_status_count(ArtworkStatus::NotChecked)
            .await
            .unwrap(),
        8
    );
}

// ============================================================================
// Library updater
// ============================================================================

#[core_async::test]
async fn test_artwork_migration_merges_duplicates() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let (winner, loser, broken) = seed_legacy_artwork(&store).await;
    let versions = versions();
    let updater = LibraryUpdater::new(
        store.clone(),
        Arc::new(QueryArtworkUrlParser::default()),
        versions.clone(),
    );

    let report = updater
        .perform_blocking_library_updates()
        .await
        .unwrap()
        .expect("migration should run on a legacy store");

    assert_eq!(report.parsed, 3);
    assert_eq!(report.deleted_unparseable, 1);
    assert_eq!(report.merged_duplicates, 1);
    assert_eq!(report.repointed_owners, 1);
    assert_eq!(versions.get().await.unwrap(), Some(LibrarySyncVersion::V9));

    let reader = store.reader();
    assert!(reader.artwork(loser).await.unwrap().is_none());
    assert!(reader.artwork(broken).await.unwrap().is_none());

    // Every remaining row has a unique, stamped identity.
    let remaining = reader
        .artworks_with_status(ArtworkStatus::NotChecked, 100)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    let mut keys = HashSet::new();
    for artwork in &remaining {
        assert!(keys.insert(artwork.key().expect("stamped")));
    }
    assert!(remaining.iter().any(|a| a.id == winner));

    let second = reader.artist_by_remote_id("2").await.unwrap().unwrap();
    assert_eq!(second.artwork_id, Some(winner));
    let third = reader.artist_by_remote_id("3").await.unwrap().unwrap();
    assert_eq!(third.artwork_id, None);

    assert!(reader
        .download(&format!("artwork-{loser}"))
        .await
        .unwrap()
        .is_none());

    // Already at v9: nothing left to do.
    assert!(updater
        .perform_blocking_library_updates()
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Background scheduling
// ============================================================================

#[core_async::test]
async fn test_manager_migrates_before_scheduling_and_then_resyncs() {
    let mut state = small_library();
    state
        .images
        .insert(DEFAULT_ARTWORK_URL.to_string(), Bytes::from_static(PLACEHOLDER));
    let store = LibraryStore::open_in_memory().await.unwrap();
    let (_, loser, _) = seed_legacy_artwork(&store).await;
    let catalog = MockCatalog::new(state);
    let versions = versions();

    let syncer = library_syncer(&store, &catalog);
    let manager = BackgroundSyncerManager::new(
        syncer,
        artwork_syncer(&store, &catalog, 10),
        LibraryUpdater::new(store.clone(), catalog_parser(), versions.clone()),
        versions.clone(),
    );

    assert!(manager.start().await.unwrap());

    // The migration committed before start returned.
    assert!(store.reader().artwork(loser).await.unwrap().is_none());
    assert!(versions.get().await.unwrap() >= Some(LibrarySyncVersion::V9));

    wait_until_idle(&manager).await;

    assert_eq!(versions.get().await.unwrap(), Some(LibrarySyncVersion::NEWEST));
    let resync = store
        .reader()
        .latest_wave(WaveKind::VersionResync)
        .await
        .unwrap()
        .expect("version resync wave");
    assert!(resync.is_done());
    assert!(store
        .reader()
        .latest_wave(WaveKind::Library)
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.reader().song_count().await.unwrap(), 10);
}

#[core_async::test]
async fn test_manager_on_current_version_runs_incremental_sync() {
    let (store, catalog) = synced_library(small_library()).await;
    let versions = versions();
    versions.set(LibrarySyncVersion::NEWEST).await.unwrap();
    catalog.clear_requests().await;

    let manager = BackgroundSyncerManager::new(
        library_syncer(&store, &catalog),
        artwork_syncer(&store, &catalog, 10),
        LibraryUpdater::new(store.clone(), catalog_parser(), versions.clone()),
        versions.clone(),
    );

    assert!(manager.start().await.unwrap());
    wait_until_idle(&manager).await;

    let requests = catalog.requests().await;
    assert!(requests.contains(&"metadata".to_string()));
    assert!(!requests.iter().any(|r| r.starts_with("artists@")));
    assert_eq!(store.reader().waves().await.unwrap().len(), 1);
}

#[core_async::test]
async fn test_background_syncer_stops_and_restarts() {
    let mut state = small_library();
    state
        .images
        .insert(DEFAULT_ARTWORK_URL.to_string(), Bytes::from_static(PLACEHOLDER));
    let (store, catalog) = synced_library(state).await;

    let background = BackgroundSyncer::new(
        library_syncer(&store, &catalog),
        artwork_syncer(&store, &catalog, 1),
    );

    assert!(background.start().await);
    assert!(!background.start().await);

    background.stop_and_wait().await;
    assert_eq!(background.state().await, WorkerState::Idle);

    assert!(background.start().await);
    background.stop_and_wait().await;
    assert_eq!(background.state().await, WorkerState::Idle);
}

fn catalog_parser() -> Arc<dyn core_sync::ArtworkUrlParser> {
    Arc::new(QueryArtworkUrlParser::default())
}
