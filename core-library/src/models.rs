//! Domain models for the library store
//!
//! Every catalog entity carries a local integer `id` and the server's
//! `remote_id`; the remote id is what sync reconciles against.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Remote id of the synthetic artist that owns songs and albums whose artist
/// cannot be resolved.
pub const UNKNOWN_ARTIST_REMOTE_ID: &str = "0";
pub const UNKNOWN_ARTIST_NAME: &str = "Unknown Artist";

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Artist {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
    pub artwork_id: Option<i64>,
}

impl Artist {
    pub fn is_unknown(&self) -> bool {
        self.remote_id == UNKNOWN_ARTIST_REMOTE_ID
    }
}

/// Field values for an artist upsert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewArtist {
    pub remote_id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
    pub artwork_id: Option<i64>,
}

impl NewArtist {
    pub fn validate(&self) -> Result<(), String> {
        validate_remote_id(&self.remote_id)?;
        if self.name.trim().is_empty() {
            return Err("Artist name cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Album {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub artist_id: i64,
    pub genre_id: Option<i64>,
    pub year: Option<i64>,
    pub disc_count: Option<i64>,
    pub song_count: i64,
    pub artwork_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewAlbum {
    pub remote_id: String,
    pub name: String,
    pub artist_id: i64,
    pub genre_id: Option<i64>,
    pub year: Option<i64>,
    pub disc_count: Option<i64>,
    pub song_count: i64,
    pub artwork_id: Option<i64>,
}

impl NewAlbum {
    pub fn validate(&self) -> Result<(), String> {
        validate_remote_id(&self.remote_id)?;
        if self.name.trim().is_empty() {
            return Err("Album name cannot be empty".to_string());
        }
        if let Some(year) = self.year {
            if !(0..=9999).contains(&year) {
                return Err(format!("Album year out of range: {year}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: i64,
    pub remote_id: String,
    pub title: String,
    pub artist_id: i64,
    pub album_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration_secs: i64,
    pub bitrate: Option<i64>,
    pub content_type: Option<String>,
    /// Streaming/download URL as reported by the server
    pub url: Option<String>,
    pub artwork_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSong {
    pub remote_id: String,
    pub title: String,
    pub artist_id: i64,
    pub album_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration_secs: i64,
    pub bitrate: Option<i64>,
    pub content_type: Option<String>,
    pub url: Option<String>,
    pub artwork_id: Option<i64>,
}

impl NewSong {
    pub fn validate(&self) -> Result<(), String> {
        validate_remote_id(&self.remote_id)?;
        if self.title.trim().is_empty() {
            return Err("Song title cannot be empty".to_string());
        }
        if self.duration_secs < 0 {
            return Err("Song duration cannot be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Genre {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewGenre {
    pub remote_id: String,
    pub name: String,
    pub album_count: i64,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: i64,
    /// `None` until the playlist has been created on the server
    pub remote_id: Option<String>,
    pub name: String,
    pub remote_song_count: i64,
    pub updated_at: i64,
}

impl Playlist {
    pub fn is_synced_to_server(&self) -> bool {
        self.remote_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistItem {
    pub playlist_id: i64,
    pub position: i64,
    pub song_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Podcast {
    pub id: i64,
    pub remote_id: String,
    pub title: String,
    pub description: Option<String>,
    pub episode_count: i64,
    pub artwork_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewPodcast {
    pub remote_id: String,
    pub title: String,
    pub description: Option<String>,
    pub episode_count: i64,
    pub artwork_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PodcastEpisode {
    pub id: i64,
    pub remote_id: String,
    pub podcast_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub duration_secs: i64,
    pub published_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewPodcastEpisode {
    pub remote_id: String,
    pub podcast_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub duration_secs: i64,
    pub published_at: Option<i64>,
}

fn validate_remote_id(remote_id: &str) -> Result<(), String> {
    if remote_id.trim().is_empty() {
        return Err("Remote id cannot be empty".to_string());
    }
    Ok(())
}

// =============================================================================
// Artwork
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtworkStatus {
    NotChecked,
    FetchError,
    IsDefaultImage,
    CustomImage,
}

impl ArtworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkStatus::NotChecked => "not_checked",
            ArtworkStatus::FetchError => "fetch_error",
            ArtworkStatus::IsDefaultImage => "is_default_image",
            ArtworkStatus::CustomImage => "custom_image",
        }
    }
}

/// Post-v9 artwork identity, parsed from the artwork URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtworkKey {
    pub artwork_type: String,
    pub remote_id: String,
}

impl ArtworkKey {
    pub fn new(artwork_type: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            artwork_type: artwork_type.into(),
            remote_id: remote_id.into(),
        }
    }
}

impl fmt::Display for ArtworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.artwork_type, self.remote_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Artwork {
    pub id: i64,
    pub url: String,
    pub status: ArtworkStatus,
    pub artwork_type: Option<String>,
    pub artwork_remote_id: Option<String>,
    #[serde(skip)]
    pub image_data: Option<Vec<u8>>,
    pub updated_at: i64,
}

impl Artwork {
    pub fn key(&self) -> Option<ArtworkKey> {
        match (&self.artwork_type, &self.artwork_remote_id) {
            (Some(kind), Some(remote_id)) => Some(ArtworkKey::new(kind, remote_id)),
            _ => None,
        }
    }
}

/// Tables whose rows may point at an artwork row.
pub const ARTWORK_OWNER_TABLES: [&str; 4] = ["artists", "albums", "songs", "podcasts"];

// =============================================================================
// Sync waves
// =============================================================================

/// Phase of a sync wave. Stored as its ordinal and only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
pub enum SyncState {
    Artists = 0,
    Albums = 1,
    Songs = 2,
    Done = 3,
}

impl SyncState {
    /// The phase after this one; `Done` is terminal.
    pub fn next(self) -> SyncState {
        match self {
            SyncState::Artists => SyncState::Albums,
            SyncState::Albums => SyncState::Songs,
            SyncState::Songs | SyncState::Done => SyncState::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Artists => "artists",
            SyncState::Albums => "albums",
            SyncState::Songs => "songs",
            SyncState::Done => "done",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WaveKind {
    /// Full or incremental library sync
    Library,
    /// Catalog refresh after a sync-version bump
    VersionResync,
}

impl WaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveKind::Library => "library",
            WaveKind::VersionResync => "version_resync",
        }
    }
}

/// Remote change timestamps (seconds) reported by the library metadata call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryChangeDates {
    pub date_of_last_add: i64,
    pub date_of_last_update: i64,
    pub date_of_last_clean: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SyncWave {
    pub id: i64,
    pub sync_state: SyncState,
    pub sync_index_to_continue: i64,
    pub date_of_last_add: i64,
    pub date_of_last_update: i64,
    pub date_of_last_clean: i64,
    /// Lower bound (seconds) applied to every page request of this wave
    pub added_after: Option<i64>,
    pub kind: WaveKind,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl SyncWave {
    pub fn is_done(&self) -> bool {
        self.sync_state == SyncState::Done
    }

    pub fn change_dates(&self) -> LibraryChangeDates {
        LibraryChangeDates {
            date_of_last_add: self.date_of_last_add,
            date_of_last_update: self.date_of_last_update,
            date_of_last_clean: self.date_of_last_clean,
        }
    }

    /// Move to the next phase and rewind the offset.
    pub fn advance_phase(&mut self) {
        self.sync_state = self.sync_state.next();
        self.sync_index_to_continue = 0;
    }
}

// =============================================================================
// Downloads
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    Song,
    Artwork,
}

impl DownloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Song => "song",
            DownloadKind::Artwork => "artwork",
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "song" => Ok(DownloadKind::Song),
            "artwork" => Ok(DownloadKind::Artwork),
            other => Err(format!("unknown download kind: {other}")),
        }
    }
}

/// Why a download ended in the errored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorKind {
    Fetch,
    Canceled,
    Storage,
    NoUrl,
}

impl DownloadErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadErrorKind::Fetch => "fetch",
            DownloadErrorKind::Canceled => "canceled",
            DownloadErrorKind::Storage => "storage",
            DownloadErrorKind::NoUrl => "no_url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    Queued,
    Started,
    Finished,
    Errored,
    Canceled,
}

/// One row of the download queue. `id` is the downloadable's unique id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DownloadRecord {
    pub id: String,
    pub kind: DownloadKind,
    pub element_id: i64,
    pub url: Option<String>,
    pub creation_date: i64,
    pub start_date: Option<i64>,
    pub finish_date: Option<i64>,
    pub error_date: Option<i64>,
    pub error_kind: Option<DownloadErrorKind>,
    pub attempts: i64,
    pub is_downloading: bool,
    pub is_canceled: bool,
}

impl DownloadRecord {
    pub fn state(&self) -> DownloadState {
        if self.finish_date.is_some() {
            DownloadState::Finished
        } else if self.error_date.is_some() {
            DownloadState::Errored
        } else if self.is_canceled {
            DownloadState::Canceled
        } else if self.start_date.is_some() || self.is_downloading {
            DownloadState::Started
        } else {
            DownloadState::Queued
        }
    }
}

/// Values for enqueueing a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    pub id: String,
    pub kind: DownloadKind,
    pub element_id: i64,
    pub url: Option<String>,
    pub creation_date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SongFile {
    pub song_id: i64,
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub stored_at: i64,
}
