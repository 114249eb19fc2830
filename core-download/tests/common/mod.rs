//! Shared fixtures: stores seeded with songs and artwork.

#![allow(dead_code)]

use bridge_traits::ManualClock;
use core_async::time::{sleep, Duration};
use core_download::{DownloadRequestManager, DownloadScope};
use core_library::models::{Artwork, NewArtist, NewSong, Song};
use core_library::LibraryStore;
use core_runtime::events::EventBus;
use std::future::Future;
use std::sync::Arc;

pub fn song_url(remote_id: &str) -> String {
    format!("https://music.test/play/{remote_id}")
}

/// Songs `s1..=sN` of one artist, each with a play URL.
pub async fn seed_songs(store: &LibraryStore, count: usize) -> Vec<Song> {
    let mut session = store.begin().await.unwrap();
    let artist = session
        .artists()
        .upsert(&NewArtist {
            remote_id: "ar1".to_string(),
            name: "Artist".to_string(),
            ..NewArtist::default()
        })
        .await
        .unwrap();

    let mut songs = Vec::with_capacity(count);
    for i in 1..=count {
        let remote_id = format!("s{i}");
        let song = session
            .songs()
            .upsert(&NewSong {
                url: Some(song_url(&remote_id)),
                remote_id,
                title: format!("Song {i}"),
                artist_id: artist.id,
                duration_secs: 200,
                ..NewSong::default()
            })
            .await
            .unwrap();
        songs.push(song);
    }
    session.save().await.unwrap();
    songs
}

pub async fn seed_artwork(store: &LibraryStore, url: &str) -> Artwork {
    let mut session = store.begin().await.unwrap();
    let artwork = session.artworks().ensure(url, None).await.unwrap();
    session.save().await.unwrap();
    artwork
}

/// Request manager over `store` whose clock starts at t=1000ms.
pub fn requests(
    store: &LibraryStore,
    scope: DownloadScope,
    events: &EventBus,
) -> (DownloadRequestManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(1_000));
    let manager =
        DownloadRequestManager::new(store.clone(), scope, events.clone()).with_clock(clock.clone());
    (manager, clock)
}

/// Poll `check` until it returns true or about two seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}
