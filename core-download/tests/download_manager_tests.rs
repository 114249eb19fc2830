//! Download manager scenarios against a mocked fetcher.

mod common;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bytes::Bytes;
use common::{eventually, requests, seed_artwork, seed_songs, song_url};
use core_async::sync::broadcast::Receiver;
use core_download::{
    ArtworkSink, DownloadFetcher, DownloadManager, DownloadManagerState, DownloadRequestManager,
    DownloadScope, FetchedFile,
};
use core_library::models::{ArtworkStatus, DownloadErrorKind, DownloadKind, DownloadState};
use core_library::LibraryStore;
use core_runtime::config::DownloadSettings;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Fetcher {}

    #[async_trait]
    impl DownloadFetcher for Fetcher {
        async fn fetch(&self, url: &str) -> BridgeResult<FetchedFile>;
    }
}

fn settings() -> DownloadSettings {
    DownloadSettings {
        max_concurrent: 2,
        max_attempts: 3,
        initial_backoff_ms: 1,
        poll_interval_ms: 10,
    }
}

fn file(data: &'static [u8]) -> FetchedFile {
    FetchedFile {
        data: Bytes::from_static(data),
        content_type: Some("audio/mpeg".to_string()),
    }
}

async fn finished_count(queue: &DownloadRequestManager) -> usize {
    queue
        .list(Some(DownloadState::Finished))
        .await
        .unwrap()
        .len()
}

fn download_events(events: &mut Receiver<CoreEvent>) -> Vec<DownloadEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Download(event) = event {
            seen.push(event);
        }
    }
    seen
}

#[core_async::test]
async fn test_manager_stores_song_files() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(128);
    let mut receiver = events.subscribe();
    let songs = seed_songs(&store, 3).await;
    let (queue, _) = requests(&store, DownloadScope::Kind(DownloadKind::Song), &events);

    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch()
        .times(3)
        .returning(|_| Ok(file(b"song bytes")));

    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    assert!(manager.start().await.unwrap());
    assert!(!manager.start().await.unwrap());

    for song in &songs {
        queue.add(song).await.unwrap();
    }
    eventually(|| {
        let queue = queue.clone();
        async move { finished_count(&queue).await == 3 }
    })
    .await;

    manager.stop_and_wait().await;
    assert_eq!(manager.state().await, DownloadManagerState::Idle);

    let reader = store.reader();
    for song in &songs {
        let stored = reader.song_file(song.id).await.unwrap().expect("song file");
        assert_eq!(stored.data, b"song bytes".to_vec());
        assert_eq!(stored.content_type.as_deref(), Some("audio/mpeg"));
    }

    let finished = queue.list(Some(DownloadState::Finished)).await.unwrap();
    assert!(finished.iter().all(|r| r.attempts == 1 && r.start_date.is_some()));

    let events = download_events(&mut receiver);
    let count = |pred: fn(&DownloadEvent) -> bool| events.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, DownloadEvent::Queued { .. })), 3);
    assert_eq!(count(|e| matches!(e, DownloadEvent::Started { .. })), 3);
    assert_eq!(
        count(|e| matches!(e, DownloadEvent::Finished { bytes: 10, .. })),
        3
    );
}

#[core_async::test]
async fn test_manager_retries_then_records_error() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let mut receiver = events.subscribe();
    let songs = seed_songs(&store, 1).await;
    let (queue, _) = requests(&store, DownloadScope::All, &events);
    queue.add(&songs[0]).await.unwrap();

    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch()
        .withf(|url| url == song_url("s1"))
        .times(3)
        .returning(|url| {
            Err(BridgeError::HttpStatus {
                status: 503,
                url: url.to_string(),
            })
        });

    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    manager.start().await.unwrap();
    eventually(|| {
        let queue = queue.clone();
        async move {
            queue
                .get("song-s1")
                .await
                .unwrap()
                .is_some_and(|r| r.state() == DownloadState::Errored)
        }
    })
    .await;
    manager.stop_and_wait().await;

    let record = queue.get("song-s1").await.unwrap().unwrap();
    assert_eq!(record.error_kind, Some(DownloadErrorKind::Fetch));
    assert_eq!(record.attempts, 3);
    assert!(store.reader().song_file(songs[0].id).await.unwrap().is_none());

    assert!(download_events(&mut receiver)
        .iter()
        .any(|e| matches!(e, DownloadEvent::Failed { attempts: 3, .. })));

    // Errored rows block re-enqueue until cleared.
    assert!(!queue.add(&songs[0]).await.unwrap());
    assert_eq!(queue.clear_finished_downloads().await.unwrap(), 1);
    assert!(queue.add(&songs[0]).await.unwrap());
}

#[core_async::test]
async fn test_permanent_failure_is_not_retried() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let songs = seed_songs(&store, 1).await;
    let (queue, _) = requests(&store, DownloadScope::All, &events);
    queue.add(&songs[0]).await.unwrap();

    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().times(1).returning(|url| {
        Err(BridgeError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    });

    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    manager.start().await.unwrap();
    eventually(|| {
        let queue = queue.clone();
        async move {
            queue
                .list(Some(DownloadState::Errored))
                .await
                .unwrap()
                .len()
                == 1
        }
    })
    .await;
    manager.stop_and_wait().await;

    assert_eq!(queue.get("song-s1").await.unwrap().unwrap().attempts, 1);
}

#[core_async::test]
async fn test_start_requeues_interrupted_downloads() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let songs = seed_songs(&store, 2).await;
    let (queue, _) = requests(&store, DownloadScope::All, &events);
    queue.add(&songs[0]).await.unwrap();
    queue.add(&songs[1]).await.unwrap();

    // A previous run claimed and started both rows, then died.
    for _ in 0..2 {
        let record = queue.get_next_request_to_download().await.unwrap().unwrap();
        queue.mark_started(&record.id).await.unwrap();
    }
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch()
        .times(2)
        .returning(|_| Ok(file(b"bytes")));

    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    manager.start().await.unwrap();
    eventually(|| {
        let queue = queue.clone();
        async move { finished_count(&queue).await == 2 }
    })
    .await;
    manager.stop_and_wait().await;
}

/// Cancels its own download while the bytes are in flight.
struct CancelingFetcher {
    queue: DownloadRequestManager,
}

#[async_trait]
impl DownloadFetcher for CancelingFetcher {
    async fn fetch(&self, _url: &str) -> BridgeResult<FetchedFile> {
        self.queue.cancel("song-s1").await.unwrap();
        Ok(file(b"late bytes"))
    }
}

#[core_async::test]
async fn test_canceled_download_drops_fetched_bytes() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let mut receiver = events.subscribe();
    let songs = seed_songs(&store, 1).await;
    let (queue, _) = requests(&store, DownloadScope::All, &events);
    queue.add(&songs[0]).await.unwrap();

    let fetcher = CancelingFetcher {
        queue: queue.clone(),
    };
    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    manager.start().await.unwrap();
    eventually(|| {
        let queue = queue.clone();
        async move {
            queue
                .get("song-s1")
                .await
                .unwrap()
                .is_some_and(|r| r.is_canceled && !r.is_downloading)
        }
    })
    .await;
    manager.stop_and_wait().await;

    assert!(store.reader().song_file(songs[0].id).await.unwrap().is_none());
    let record = queue.get("song-s1").await.unwrap().unwrap();
    assert_eq!(record.state(), DownloadState::Canceled);
    assert!(download_events(&mut receiver)
        .iter()
        .any(|e| matches!(e, DownloadEvent::Canceled { .. })));
}

#[core_async::test]
async fn test_artwork_downloads_are_classified() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let default = seed_artwork(&store, "https://music.test/image.php?object_id=1").await;
    let custom = seed_artwork(&store, "https://music.test/image.php?object_id=2").await;
    let (queue, _) = requests(&store, DownloadScope::Kind(DownloadKind::Artwork), &events);
    queue.add(&default).await.unwrap();
    queue.add(&custom).await.unwrap();

    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().times(2).returning(|url| {
        let data: &'static [u8] = if url.ends_with("object_id=1") {
            b"placeholder"
        } else {
            b"cover"
        };
        Ok(FetchedFile {
            data: Bytes::from_static(data),
            content_type: Some("image/png".to_string()),
        })
    });

    let sink = ArtworkSink::new().with_default_image(Bytes::from_static(b"placeholder"));
    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings())
        .with_sink(DownloadKind::Artwork, Arc::new(sink));
    manager.start().await.unwrap();
    eventually(|| {
        let queue = queue.clone();
        async move { finished_count(&queue).await == 2 }
    })
    .await;
    manager.stop_and_wait().await;

    let reader = store.reader();
    let default = reader.artwork(default.id).await.unwrap().unwrap();
    assert_eq!(default.status, ArtworkStatus::IsDefaultImage);
    assert_eq!(default.image_data, None);
    let custom = reader.artwork(custom.id).await.unwrap().unwrap();
    assert_eq!(custom.status, ArtworkStatus::CustomImage);
    assert_eq!(custom.image_data.as_deref(), Some(&b"cover"[..]));
}

#[core_async::test]
async fn test_stop_leaves_queue_untouched() {
    let store = LibraryStore::open_in_memory().await.unwrap();
    let events = EventBus::new(64);
    let (queue, _) = requests(&store, DownloadScope::All, &events);

    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().never();

    let manager = DownloadManager::new(queue.clone(), Arc::new(fetcher), &settings());
    manager.start().await.unwrap();
    manager.stop().await;
    assert_ne!(manager.state().await, DownloadManagerState::Running);
    manager.stop_and_wait().await;
    assert_eq!(manager.state().await, DownloadManagerState::Idle);

    let songs = seed_songs(&store, 1).await;
    queue.add(&songs[0]).await.unwrap();
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}
