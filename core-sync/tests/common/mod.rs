//! Shared fixtures: an in-memory remote catalog that records every request.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bytes::Bytes;
use core_async::sync::{CancellationToken, Mutex as AsyncMutex};
use core_async::time::{sleep, Duration};
use core_library::models::LibraryChangeDates;
use core_sync::{
    ArtworkUrlParser, LibraryMetadata, PageQuery, QueryArtworkUrlParser, RemoteAlbum,
    RemoteArtist, RemoteCatalog, RemoteGenre, RemotePlaylist, RemotePodcast,
    RemotePodcastEpisode, RemoteSong,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_ARTWORK_URL: &str =
    "https://music.test/image.php?object_type=default&object_id=0";
pub const PLACEHOLDER: &[u8] = b"placeholder-image";

pub fn artwork_url(kind: &str, id: &str, auth: &str) -> String {
    format!("https://music.test/image.php?object_type={kind}&object_id={id}&auth={auth}")
}

/// A catalog entry plus the time (seconds) it was added on the server.
#[derive(Debug, Clone)]
pub struct Dated<T> {
    pub added: i64,
    pub item: T,
}

#[derive(Debug, Default)]
pub struct CatalogState {
    pub change_dates: LibraryChangeDates,
    pub artists: Vec<Dated<RemoteArtist>>,
    pub albums: Vec<Dated<RemoteAlbum>>,
    pub songs: Vec<Dated<RemoteSong>>,
    pub genres: Vec<RemoteGenre>,
    pub playlists: Vec<RemotePlaylist>,
    pub playlist_songs: HashMap<String, Vec<RemoteSong>>,
    pub podcasts: Vec<RemotePodcast>,
    pub episodes: HashMap<String, Vec<RemotePodcastEpisode>>,
    pub images: HashMap<String, Bytes>,
    /// Every request in order, e.g. `artists@0`, `metadata`
    pub requests: Vec<String>,
    /// Page requests (artists/albums/songs) that fail, as `songs@4`
    pub failing_pages: Vec<String>,
    /// Cancel this token once this many page requests were served
    pub cancel_after_pages: Option<(usize, CancellationToken)>,
    pub pages_served: usize,
    /// Each page request waits this long before answering
    pub page_delay: Option<Duration>,
    /// `playlists()` fails while set
    pub playlists_unavailable: bool,
    pub next_playlist_id: u32,
}

#[derive(Clone, Default)]
pub struct MockCatalog {
    pub state: Arc<AsyncMutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new(state: CatalogState) -> Self {
        Self {
            state: Arc::new(AsyncMutex::new(state)),
        }
    }

    pub async fn requests(&self) -> Vec<String> {
        self.state.lock().await.requests.clone()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    async fn page<T: Clone>(
        &self,
        name: &str,
        query: PageQuery,
        select: impl Fn(&CatalogState) -> &Vec<Dated<T>>,
    ) -> Result<Vec<T>> {
        let delay = self.state.lock().await.page_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        let label = format!("{name}@{}", query.start_index);
        state.requests.push(label.clone());

        if state.failing_pages.contains(&label) {
            return Err(BridgeError::OperationFailed(format!("{label} unavailable")));
        }

        let items: Vec<T> = select(&state)
            .iter()
            .filter(|d| query.added_after.map_or(true, |after| d.added >= after))
            .skip(query.start_index as usize)
            .take(query.limit as usize)
            .map(|d| d.item.clone())
            .collect();

        state.pages_served += 1;
        if let Some((after, token)) = &state.cancel_after_pages {
            if state.pages_served >= *after {
                token.cancel();
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl RemoteCatalog for MockCatalog {
    async fn library_metadata(&self) -> Result<LibraryMetadata> {
        let mut state = self.state.lock().await;
        state.requests.push("metadata".to_string());
        Ok(LibraryMetadata {
            change_dates: state.change_dates,
            artist_count: state.artists.len() as u64,
            album_count: state.albums.len() as u64,
            song_count: state.songs.len() as u64,
        })
    }

    async fn artists(&self, query: PageQuery) -> Result<Vec<RemoteArtist>> {
        self.page("artists", query, |s| &s.artists).await
    }

    async fn albums(&self, query: PageQuery) -> Result<Vec<RemoteAlbum>> {
        self.page("albums", query, |s| &s.albums).await
    }

    async fn songs(&self, query: PageQuery) -> Result<Vec<RemoteSong>> {
        self.page("songs", query, |s| &s.songs).await
    }

    async fn genres(&self) -> Result<Vec<RemoteGenre>> {
        let mut state = self.state.lock().await;
        state.requests.push("genres".to_string());
        Ok(state.genres.clone())
    }

    async fn playlists(&self) -> Result<Vec<RemotePlaylist>> {
        let mut state = self.state.lock().await;
        state.requests.push("playlists".to_string());
        if state.playlists_unavailable {
            return Err(BridgeError::NotAvailable("playlists offline".to_string()));
        }
        Ok(state.playlists.clone())
    }

    async fn playlist_songs(&self, playlist_id: &str) -> Result<Vec<RemoteSong>> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("playlist_songs:{playlist_id}"));
        Ok(state
            .playlist_songs
            .get(playlist_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_playlist(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        state.next_playlist_id += 1;
        let id = format!("pl-new-{}", state.next_playlist_id);
        state.requests.push(format!("create_playlist:{name}"));
        state.playlists.push(RemotePlaylist {
            id: id.clone(),
            name: name.to_string(),
            song_count: 0,
        });
        state.playlist_songs.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn add_to_playlist(&self, playlist_id: &str, song_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("add:{playlist_id}:{song_id}"));
        let song = state
            .songs
            .iter()
            .find(|d| d.item.id == song_id)
            .map(|d| d.item.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("no song {song_id}")))?;
        state
            .playlist_songs
            .entry(playlist_id.to_string())
            .or_default()
            .push(song);
        Ok(())
    }

    async fn remove_from_playlist(&self, playlist_id: &str, index: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("remove:{playlist_id}:{index}"));
        let entries = state
            .playlist_songs
            .get_mut(playlist_id)
            .ok_or_else(|| BridgeError::OperationFailed(format!("no playlist {playlist_id}")))?;
        if index >= entries.len() {
            return Err(BridgeError::OperationFailed(format!("index {index} out of range")));
        }
        entries.remove(index);
        Ok(())
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("delete_playlist:{playlist_id}"));
        state.playlists.retain(|p| p.id != playlist_id);
        state.playlist_songs.remove(playlist_id);
        Ok(())
    }

    async fn podcasts(&self) -> Result<Vec<RemotePodcast>> {
        let mut state = self.state.lock().await;
        state.requests.push("podcasts".to_string());
        Ok(state.podcasts.clone())
    }

    async fn podcast_episodes(&self, podcast_id: &str) -> Result<Vec<RemotePodcastEpisode>> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("episodes:{podcast_id}"));
        Ok(state.episodes.get(podcast_id).cloned().unwrap_or_default())
    }

    async fn fetch_artwork(&self, url: &str) -> Result<Bytes> {
        let mut state = self.state.lock().await;
        state.requests.push(format!("artwork:{url}"));
        state.images.get(url).cloned().ok_or_else(|| BridgeError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    }

    fn default_artwork_url(&self) -> String {
        DEFAULT_ARTWORK_URL.to_string()
    }

    fn artwork_url_parser(&self) -> Arc<dyn ArtworkUrlParser> {
        Arc::new(QueryArtworkUrlParser::default())
    }
}

fn dated<T>(added: i64, item: T) -> Dated<T> {
    Dated { added, item }
}

pub fn artist(id: u32, added: i64) -> Dated<RemoteArtist> {
    dated(
        added,
        RemoteArtist {
            id: format!("ar{id}"),
            name: format!("Artist {id}"),
            album_count: 1,
            song_count: 2,
            artwork_url: Some(artwork_url("artist", &format!("ar{id}"), "t1")),
        },
    )
}

pub fn album(id: u32, artist: u32, added: i64) -> Dated<RemoteAlbum> {
    dated(
        added,
        RemoteAlbum {
            id: format!("al{id}"),
            name: format!("Album {id}"),
            artist_id: Some(format!("ar{artist}")),
            year: Some(1990 + id as i64),
            song_count: 2,
            artwork_url: Some(artwork_url("album", &format!("al{id}"), "t1")),
            ..RemoteAlbum::default()
        },
    )
}

pub fn song(id: u32, album: u32, artist: u32, added: i64) -> Dated<RemoteSong> {
    dated(
        added,
        RemoteSong {
            id: format!("s{id}"),
            title: format!("Song {id}"),
            artist_id: Some(format!("ar{artist}")),
            album_id: Some(format!("al{album}")),
            track_number: Some(id as i64),
            duration_secs: 180,
            url: Some(format!("https://music.test/play/s{id}")),
            artwork_url: Some(artwork_url("album", &format!("al{album}"), "t1")),
            ..RemoteSong::default()
        },
    )
}

/// 3 artists, 5 albums, 10 songs and 2 playlists, all added at t=1000.
pub fn small_library() -> CatalogState {
    let artists = (1..=3).map(|i| artist(i, 1000)).collect();
    let albums: Vec<_> = (1..=5).map(|i| album(i, (i - 1) % 3 + 1, 1000)).collect();
    let songs: Vec<_> = (1..=10)
        .map(|i| {
            let album = (i - 1) / 2 + 1;
            song(i, album, (album - 1) % 3 + 1, 1000)
        })
        .collect();

    let playlists = vec![
        RemotePlaylist {
            id: "pl1".to_string(),
            name: "Morning".to_string(),
            song_count: 3,
        },
        RemotePlaylist {
            id: "pl2".to_string(),
            name: "Evening".to_string(),
            song_count: 2,
        },
    ];
    let mut playlist_songs = HashMap::new();
    playlist_songs.insert(
        "pl1".to_string(),
        vec![songs[0].item.clone(), songs[4].item.clone(), songs[0].item.clone()],
    );
    playlist_songs.insert(
        "pl2".to_string(),
        vec![songs[8].item.clone(), songs[9].item.clone()],
    );

    CatalogState {
        change_dates: LibraryChangeDates {
            date_of_last_add: 1000,
            date_of_last_update: 1000,
            date_of_last_clean: 0,
        },
        artists,
        albums,
        songs,
        playlists,
        playlist_songs,
        ..CatalogState::default()
    }
}
