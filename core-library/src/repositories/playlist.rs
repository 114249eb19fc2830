//! Playlist repository
//!
//! Playlists created locally have no remote id until they are uploaded.
//! Items are ordered by `position` (0-based, contiguous) and may repeat a
//! song.

use crate::error::{LibraryError, Result};
use crate::models::{Playlist, PlaylistItem};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

pub struct PlaylistRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> PlaylistRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(playlist)
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>("SELECT * FROM playlists WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(playlist)
    }

    /// A playlist that exists only on this device.
    pub async fn create_local(&mut self, name: &str, now: i64) -> Result<Playlist> {
        if name.trim().is_empty() {
            return Err(LibraryError::invalid("Playlist", "name cannot be empty"));
        }

        let playlist = query_as::<_, Playlist>(
            "INSERT INTO playlists (remote_id, name, updated_at) VALUES (NULL, ?, ?) RETURNING *",
        )
        .bind(name)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("playlists");
        Ok(playlist)
    }

    /// Insert or rename the playlist known to the server as `remote_id`.
    pub async fn upsert_remote(
        &mut self,
        remote_id: &str,
        name: &str,
        remote_song_count: i64,
        now: i64,
    ) -> Result<Playlist> {
        let playlist = query_as::<_, Playlist>(
            r#"
            INSERT INTO playlists (remote_id, name, remote_song_count, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                remote_song_count = excluded.remote_song_count,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(remote_id)
        .bind(name)
        .bind(remote_song_count)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("playlists");
        Ok(playlist)
    }

    /// Record the id the server assigned after an upload.
    pub async fn set_remote_id(&mut self, id: i64, remote_id: &str) -> Result<()> {
        let result = query("UPDATE playlists SET remote_id = ? WHERE id = ?")
            .bind(remote_id)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Playlist", id));
        }
        self.changes.touch("playlists");
        Ok(())
    }

    pub async fn items(&mut self, playlist_id: i64) -> Result<Vec<PlaylistItem>> {
        let items = query_as::<_, PlaylistItem>(
            "SELECT * FROM playlist_items WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(items)
    }

    /// Remote ids of the playlist's songs, in playlist order.
    pub async fn song_remote_ids(&mut self, playlist_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as(
            r#"
            SELECT s.remote_id FROM playlist_items pi
            INNER JOIN songs s ON s.id = pi.song_id
            WHERE pi.playlist_id = ?
            ORDER BY pi.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows.into_iter().map(|(remote_id,)| remote_id).collect())
    }

    /// Replace the whole item list with `song_ids`, in order.
    pub async fn replace_items(&mut self, playlist_id: i64, song_ids: &[i64]) -> Result<()> {
        query("DELETE FROM playlist_items WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *self.conn)
            .await?;

        for (position, song_id) in song_ids.iter().enumerate() {
            query("INSERT INTO playlist_items (playlist_id, position, song_id) VALUES (?, ?, ?)")
                .bind(playlist_id)
                .bind(position as i64)
                .bind(song_id)
                .execute(&mut *self.conn)
                .await?;
        }

        self.changes.touch("playlist_items");
        Ok(())
    }

    pub async fn append_item(&mut self, playlist_id: i64, song_id: i64) -> Result<PlaylistItem> {
        let item = query_as::<_, PlaylistItem>(
            r#"
            INSERT INTO playlist_items (playlist_id, position, song_id)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_items WHERE playlist_id = ?1),
                ?2
            )
            RETURNING *
            "#,
        )
        .bind(playlist_id)
        .bind(song_id)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("playlist_items");
        Ok(item)
    }

    /// Deletes the playlist and its items.
    pub async fn delete(&mut self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.changes.touch("playlists");
            self.changes.touch("playlist_items");
        }
        Ok(result.rows_affected() > 0)
    }
}
