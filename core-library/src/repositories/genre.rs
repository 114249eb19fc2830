//! Genre repository

use crate::error::{LibraryError, Result};
use crate::models::{Genre, NewGenre};
use crate::repositories::ChangeSet;
use sqlx::{query_as, SqliteConnection};

pub struct GenreRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> GenreRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Genre>> {
        let genre = query_as::<_, Genre>("SELECT * FROM genres WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(genre)
    }

    pub async fn upsert(&mut self, genre: &NewGenre) -> Result<Genre> {
        if genre.remote_id.trim().is_empty() || genre.name.trim().is_empty() {
            return Err(LibraryError::invalid(
                "Genre",
                "remote id and name are required",
            ));
        }

        let stored = query_as::<_, Genre>(
            r#"
            INSERT INTO genres (remote_id, name, album_count, song_count)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                album_count = excluded.album_count,
                song_count = excluded.song_count
            RETURNING *
            "#,
        )
        .bind(&genre.remote_id)
        .bind(&genre.name)
        .bind(genre.album_count)
        .bind(genre.song_count)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("genres");
        Ok(stored)
    }

    pub async fn count(&mut self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM genres")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}
