//! # Remote Catalog Contract
//!
//! What the syncers need from the music server. Implementations wrap the
//! server's API (Ampache, Subsonic, ...) and return typed records; ids are
//! strings even when the server reports integers.
//!
//! Paged listings must be stable for a given `added_after`: asking again for
//! the same `start_index` returns the same items, so a resumed wave neither
//! skips nor repeats rows.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bytes::Bytes;
use core_library::models::{ArtworkKey, LibraryChangeDates};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of the library metadata call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub change_dates: LibraryChangeDates,
    pub artist_count: u64,
    pub album_count: u64,
    pub song_count: u64,
}

/// One page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageQuery {
    /// Only items added after this time (seconds)
    pub added_after: Option<i64>,
    pub start_index: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteArtist {
    pub id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    pub name: String,
    pub artist_id: Option<String>,
    pub genre_id: Option<String>,
    pub year: Option<i64>,
    pub disc_count: Option<i64>,
    pub song_count: i64,
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteSong {
    pub id: String,
    pub title: String,
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub genre_id: Option<String>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration_secs: i64,
    pub bitrate: Option<i64>,
    pub content_type: Option<String>,
    pub url: Option<String>,
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteGenre {
    pub id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemotePodcast {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub episode_count: i64,
    pub artwork_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemotePodcastEpisode {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub duration_secs: i64,
    pub published_at: Option<i64>,
}

/// Extracts the stable artwork identity from a (volatile) artwork URL.
pub trait ArtworkUrlParser: Send + Sync {
    fn parse(&self, url: &str) -> Option<ArtworkKey>;
}

/// Parser for URLs that carry the identity in two query parameters, e.g.
/// `image.php?object_type=album&object_id=42&auth=…`.
#[derive(Debug, Clone)]
pub struct QueryArtworkUrlParser {
    type_param: String,
    id_param: String,
}

impl QueryArtworkUrlParser {
    pub fn new(type_param: impl Into<String>, id_param: impl Into<String>) -> Self {
        Self {
            type_param: type_param.into(),
            id_param: id_param.into(),
        }
    }
}

impl Default for QueryArtworkUrlParser {
    fn default() -> Self {
        Self::new("object_type", "object_id")
    }
}

impl ArtworkUrlParser for QueryArtworkUrlParser {
    fn parse(&self, url: &str) -> Option<ArtworkKey> {
        let parsed = url::Url::parse(url).ok()?;
        let mut kind = None;
        let mut id = None;

        for (key, value) in parsed.query_pairs() {
            if key == self.type_param.as_str() {
                kind = Some(value.into_owned());
            } else if key == self.id_param.as_str() {
                id = Some(value.into_owned());
            }
        }

        match (kind, id) {
            (Some(kind), Some(id)) if !kind.is_empty() && !id.is_empty() => {
                Some(ArtworkKey::new(kind, id))
            }
            _ => None,
        }
    }
}

/// The music server as seen by the syncers.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn library_metadata(&self) -> Result<LibraryMetadata>;

    async fn artists(&self, query: PageQuery) -> Result<Vec<RemoteArtist>>;

    async fn albums(&self, query: PageQuery) -> Result<Vec<RemoteAlbum>>;

    async fn songs(&self, query: PageQuery) -> Result<Vec<RemoteSong>>;

    /// Servers without genre support return nothing.
    async fn genres(&self) -> Result<Vec<RemoteGenre>> {
        Ok(Vec::new())
    }

    async fn playlists(&self) -> Result<Vec<RemotePlaylist>>;

    async fn playlist_songs(&self, playlist_id: &str) -> Result<Vec<RemoteSong>>;

    /// Returns the id of the new playlist.
    async fn create_playlist(&self, name: &str) -> Result<String>;

    async fn add_to_playlist(&self, playlist_id: &str, song_id: &str) -> Result<()>;

    /// Remove the entry at `index` (0-based) of the remote playlist.
    async fn remove_from_playlist(&self, playlist_id: &str, index: usize) -> Result<()>;

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;

    async fn podcasts(&self) -> Result<Vec<RemotePodcast>> {
        Ok(Vec::new())
    }

    async fn podcast_episodes(&self, _podcast_id: &str) -> Result<Vec<RemotePodcastEpisode>> {
        Ok(Vec::new())
    }

    async fn fetch_artwork(&self, url: &str) -> Result<Bytes>;

    /// URL of the placeholder image the server returns for missing artwork.
    fn default_artwork_url(&self) -> String;

    fn artwork_url_parser(&self) -> Arc<dyn ArtworkUrlParser>;
}
