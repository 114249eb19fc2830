//! Song repository

use crate::error::{LibraryError, Result};
use crate::models::{NewSong, Song};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "songs";

pub struct SongRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> SongRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(song)
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(song)
    }

    pub async fn upsert(&mut self, song: &NewSong) -> Result<Song> {
        song.validate()
            .map_err(|e| LibraryError::invalid("Song", e))?;

        let stored = query_as::<_, Song>(
            r#"
            INSERT INTO songs (
                remote_id, title, artist_id, album_id, genre_id, track_number,
                disc_number, duration_secs, bitrate, content_type, url, artwork_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                title = excluded.title,
                artist_id = excluded.artist_id,
                album_id = COALESCE(excluded.album_id, songs.album_id),
                genre_id = COALESCE(excluded.genre_id, songs.genre_id),
                track_number = COALESCE(excluded.track_number, songs.track_number),
                disc_number = COALESCE(excluded.disc_number, songs.disc_number),
                duration_secs = excluded.duration_secs,
                bitrate = COALESCE(excluded.bitrate, songs.bitrate),
                content_type = COALESCE(excluded.content_type, songs.content_type),
                url = COALESCE(excluded.url, songs.url),
                artwork_id = COALESCE(excluded.artwork_id, songs.artwork_id)
            RETURNING *
            "#,
        )
        .bind(&song.remote_id)
        .bind(&song.title)
        .bind(song.artist_id)
        .bind(song.album_id)
        .bind(song.genre_id)
        .bind(song.track_number)
        .bind(song.disc_number)
        .bind(song.duration_secs)
        .bind(song.bitrate)
        .bind(&song.content_type)
        .bind(&song.url)
        .bind(song.artwork_id)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch(TABLE);
        Ok(stored)
    }

    pub async fn delete(&mut self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&mut self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LibraryStore;

    #[core_async::test]
    async fn test_upsert_song_by_remote_id() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();
        let unknown = session.artists().ensure_unknown_artist().await.unwrap();

        let song = NewSong {
            remote_id: "501".to_string(),
            title: "Xtal".to_string(),
            artist_id: unknown.id,
            duration_secs: 294,
            bitrate: Some(320_000),
            ..NewSong::default()
        };
        let first = session.songs().upsert(&song).await.unwrap();
        let second = session
            .songs()
            .upsert(&NewSong {
                bitrate: None,
                title: "Xtal (remaster)".to_string(),
                ..song
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Xtal (remaster)");
        assert_eq!(second.bitrate, Some(320_000));
        assert_eq!(
            session.songs().find_by_remote_id("501").await.unwrap(),
            Some(second)
        );
    }
}
