//! Album repository

use crate::error::{LibraryError, Result};
use crate::models::{Album, NewAlbum};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "albums";

pub struct AlbumRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> AlbumRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(album)
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(album)
    }

    /// Insert or update by remote id. Optional columns the server did not
    /// report (`None`) keep their stored value.
    pub async fn upsert(&mut self, album: &NewAlbum) -> Result<Album> {
        album
            .validate()
            .map_err(|e| LibraryError::invalid("Album", e))?;

        let stored = query_as::<_, Album>(
            r#"
            INSERT INTO albums (
                remote_id, name, artist_id, genre_id, year, disc_count, song_count, artwork_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                artist_id = excluded.artist_id,
                genre_id = COALESCE(excluded.genre_id, albums.genre_id),
                year = COALESCE(excluded.year, albums.year),
                disc_count = COALESCE(excluded.disc_count, albums.disc_count),
                song_count = excluded.song_count,
                artwork_id = COALESCE(excluded.artwork_id, albums.artwork_id)
            RETURNING *
            "#,
        )
        .bind(&album.remote_id)
        .bind(&album.name)
        .bind(album.artist_id)
        .bind(album.genre_id)
        .bind(album.year)
        .bind(album.disc_count)
        .bind(album.song_count)
        .bind(album.artwork_id)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch(TABLE);
        Ok(stored)
    }

    pub async fn delete(&mut self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM albums WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&mut self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM albums")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}
