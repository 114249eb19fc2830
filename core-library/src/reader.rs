//! Read-side queries against the pool.
//!
//! Readers never take the writer lock and see the last committed state.

use crate::error::Result;
use crate::models::{
    Album, Artist, Artwork, ArtworkStatus, DownloadKind, DownloadRecord, DownloadState, Genre,
    Playlist, Podcast, PodcastEpisode, Song, SongFile, SyncWave, WaveKind,
    UNKNOWN_ARTIST_REMOTE_ID,
};
use crate::repositories::download::ELIGIBLE;
use crate::repositories::{Page, PageRequest};
use sqlx::{query_as, SqlitePool};

#[derive(Debug, Clone)]
pub struct LibraryReader {
    pool: SqlitePool,
}

impl LibraryReader {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Counts
    // ------------------------------------------------------------------

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn artist_count(&self) -> Result<i64> {
        self.count("artists").await
    }

    pub async fn album_count(&self) -> Result<i64> {
        self.count("albums").await
    }

    pub async fn song_count(&self) -> Result<i64> {
        self.count("songs").await
    }

    pub async fn genre_count(&self) -> Result<i64> {
        self.count("genres").await
    }

    pub async fn playlist_count(&self) -> Result<i64> {
        self.count("playlists").await
    }

    pub async fn podcast_count(&self) -> Result<i64> {
        self.count("podcasts").await
    }

    pub async fn artwork_count(&self) -> Result<i64> {
        self.count("artworks").await
    }

    /// Whether anything besides the Unknown Artist was ever synced.
    pub async fn has_library_data(&self) -> Result<bool> {
        let (exists,): (bool,) = query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM artists WHERE remote_id <> ?)
                OR EXISTS(SELECT 1 FROM songs)
                OR EXISTS(SELECT 1 FROM sync_waves)
            "#,
        )
        .bind(UNKNOWN_ARTIST_REMOTE_ID)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    pub async fn artists(&self, page: PageRequest) -> Result<Page<Artist>> {
        let total = self.artist_count().await?;
        let items = query_as::<_, Artist>(
            "SELECT * FROM artists ORDER BY name COLLATE NOCASE, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, total as u64, page))
    }

    pub async fn albums(&self, page: PageRequest) -> Result<Page<Album>> {
        let total = self.album_count().await?;
        let items = query_as::<_, Album>(
            "SELECT * FROM albums ORDER BY name COLLATE NOCASE, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, total as u64, page))
    }

    pub async fn songs(&self, page: PageRequest) -> Result<Page<Song>> {
        let total = self.song_count().await?;
        let items = query_as::<_, Song>(
            "SELECT * FROM songs ORDER BY title COLLATE NOCASE, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, total as u64, page))
    }

    pub async fn artist_by_remote_id(&self, remote_id: &str) -> Result<Option<Artist>> {
        let artist = query_as::<_, Artist>("SELECT * FROM artists WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artist)
    }

    pub async fn album_by_remote_id(&self, remote_id: &str) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(album)
    }

    pub async fn song(&self, id: i64) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(song)
    }

    pub async fn song_by_remote_id(&self, remote_id: &str) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(song)
    }

    pub async fn albums_of_artist(&self, artist_id: i64) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>(
            "SELECT * FROM albums WHERE artist_id = ? ORDER BY year, name COLLATE NOCASE",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(albums)
    }

    /// Songs of an album in disc/track order.
    pub async fn songs_of_album(&self, album_id: i64) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            r#"
            SELECT * FROM songs WHERE album_id = ?
            ORDER BY COALESCE(disc_number, 1), COALESCE(track_number, 0), id
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(songs)
    }

    pub async fn songs_of_artist(&self, artist_id: i64) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs WHERE artist_id = ? ORDER BY title COLLATE NOCASE, id",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(songs)
    }

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        let genres = query_as::<_, Genre>("SELECT * FROM genres ORDER BY name COLLATE NOCASE")
            .fetch_all(&self.pool)
            .await?;
        Ok(genres)
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        let playlists =
            query_as::<_, Playlist>("SELECT * FROM playlists ORDER BY name COLLATE NOCASE, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(playlists)
    }

    pub async fn playlist(&self, id: i64) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(playlist)
    }

    /// Songs of a playlist in playlist order, repeats included.
    pub async fn playlist_songs(&self, playlist_id: i64) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            r#"
            SELECT s.* FROM playlist_items pi
            INNER JOIN songs s ON s.id = pi.song_id
            WHERE pi.playlist_id = ?
            ORDER BY pi.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(songs)
    }

    pub async fn podcasts(&self) -> Result<Vec<Podcast>> {
        let podcasts =
            query_as::<_, Podcast>("SELECT * FROM podcasts ORDER BY title COLLATE NOCASE")
                .fetch_all(&self.pool)
                .await?;
        Ok(podcasts)
    }

    pub async fn podcast(&self, id: i64) -> Result<Option<Podcast>> {
        let podcast = query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(podcast)
    }

    pub async fn podcast_episodes(&self, podcast_id: i64) -> Result<Vec<PodcastEpisode>> {
        let episodes = query_as::<_, PodcastEpisode>(
            "SELECT * FROM podcast_episodes WHERE podcast_id = ? ORDER BY published_at DESC, id",
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(episodes)
    }

    // ------------------------------------------------------------------
    // Artwork
    // ------------------------------------------------------------------

    pub async fn artwork(&self, id: i64) -> Result<Option<Artwork>> {
        let artwork = query_as::<_, Artwork>("SELECT * FROM artworks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artwork)
    }

    /// Up to `limit` rows in `status`, oldest first.
    pub async fn artworks_with_status(
        &self,
        status: ArtworkStatus,
        limit: u32,
    ) -> Result<Vec<Artwork>> {
        let rows =
            query_as::<_, Artwork>("SELECT * FROM artworks WHERE status = ? ORDER BY id LIMIT ?")
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn artwork_status_count(&self, status: ArtworkStatus) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM artworks WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Sync waves
    // ------------------------------------------------------------------

    pub async fn latest_wave(&self, kind: WaveKind) -> Result<Option<SyncWave>> {
        let wave = query_as::<_, SyncWave>(
            "SELECT * FROM sync_waves WHERE kind = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(wave)
    }

    pub async fn waves(&self) -> Result<Vec<SyncWave>> {
        let waves = query_as::<_, SyncWave>("SELECT * FROM sync_waves ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(waves)
    }

    // ------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------

    pub async fn download(&self, id: &str) -> Result<Option<DownloadRecord>> {
        let record = query_as::<_, DownloadRecord>("SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Queue rows in FIFO order, optionally narrowed to one kind and state.
    pub async fn downloads(
        &self,
        kind: Option<DownloadKind>,
        state: Option<DownloadState>,
    ) -> Result<Vec<DownloadRecord>> {
        let rows = query_as::<_, DownloadRecord>(
            "SELECT * FROM downloads WHERE (?1 IS NULL OR kind = ?1) ORDER BY creation_date, rowid",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(match state {
            Some(state) => rows.into_iter().filter(|r| r.state() == state).collect(),
            None => rows,
        })
    }

    /// Rows still waiting for a worker.
    pub async fn pending_download_count(&self, kind: Option<DownloadKind>) -> Result<i64> {
        let sql =
            format!("SELECT COUNT(*) FROM downloads WHERE {ELIGIBLE} AND (?1 IS NULL OR kind = ?1)");
        let (count,): (i64,) = query_as(&sql).bind(kind).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// `false` for unknown ids.
    pub async fn is_download_canceled(&self, id: &str) -> Result<bool> {
        let row: Option<(bool,)> = query_as("SELECT is_canceled FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(canceled,)| canceled).unwrap_or(false))
    }

    pub async fn song_file(&self, song_id: i64) -> Result<Option<SongFile>> {
        let file = query_as::<_, SongFile>("SELECT * FROM song_files WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }
}
