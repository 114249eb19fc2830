//! Artist repository

use crate::error::{LibraryError, Result};
use crate::models::{Artist, NewArtist, UNKNOWN_ARTIST_NAME, UNKNOWN_ARTIST_REMOTE_ID};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "artists";

pub struct ArtistRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> ArtistRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Artist>> {
        let artist = query_as::<_, Artist>("SELECT * FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(artist)
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Artist>> {
        let artist = query_as::<_, Artist>("SELECT * FROM artists WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(artist)
    }

    /// Insert the artist or update the row with the same remote id in place.
    ///
    /// An incoming `artwork_id` of `None` keeps the stored reference.
    pub async fn upsert(&mut self, artist: &NewArtist) -> Result<Artist> {
        artist
            .validate()
            .map_err(|e| LibraryError::invalid("Artist", e))?;

        let stored = query_as::<_, Artist>(
            r#"
            INSERT INTO artists (remote_id, name, album_count, song_count, artwork_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                album_count = excluded.album_count,
                song_count = excluded.song_count,
                artwork_id = COALESCE(excluded.artwork_id, artists.artwork_id)
            RETURNING *
            "#,
        )
        .bind(&artist.remote_id)
        .bind(&artist.name)
        .bind(artist.album_count)
        .bind(artist.song_count)
        .bind(artist.artwork_id)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch(TABLE);
        Ok(stored)
    }

    /// The synthetic artist for unresolvable references, created on first use.
    pub async fn ensure_unknown_artist(&mut self) -> Result<Artist> {
        let inserted = query(
            "INSERT INTO artists (remote_id, name) VALUES (?, ?) ON CONFLICT(remote_id) DO NOTHING",
        )
        .bind(UNKNOWN_ARTIST_REMOTE_ID)
        .bind(UNKNOWN_ARTIST_NAME)
        .execute(&mut *self.conn)
        .await?;

        if inserted.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }

        self.find_by_remote_id(UNKNOWN_ARTIST_REMOTE_ID)
            .await?
            .ok_or_else(|| LibraryError::not_found("Artist", UNKNOWN_ARTIST_REMOTE_ID))
    }

    pub async fn delete(&mut self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM artists WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&mut self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM artists")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LibraryStore;

    fn artist(remote_id: &str, name: &str) -> NewArtist {
        NewArtist {
            remote_id: remote_id.to_string(),
            name: name.to_string(),
            ..NewArtist::default()
        }
    }

    #[core_async::test]
    async fn test_upsert_updates_in_place() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let first = session.artists().upsert(&artist("7", "Boards of Canada")).await.unwrap();
        let mut renamed = artist("7", "BoC");
        renamed.album_count = 4;
        let second = session.artists().upsert(&renamed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "BoC");
        assert_eq!(second.album_count, 4);
        assert_eq!(session.artists().count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_upsert_keeps_artwork_when_absent() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let artwork = session
            .artworks()
            .ensure("https://h/image.php?object_type=artist&object_id=7", None)
            .await
            .unwrap();
        let mut with_art = artist("7", "Autechre");
        with_art.artwork_id = Some(artwork.id);
        session.artists().upsert(&with_art).await.unwrap();

        let updated = session.artists().upsert(&artist("7", "Autechre")).await.unwrap();
        assert_eq!(updated.artwork_id, Some(artwork.id));
    }

    #[core_async::test]
    async fn test_unknown_artist_created_once() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let a = session.artists().ensure_unknown_artist().await.unwrap();
        let b = session.artists().ensure_unknown_artist().await.unwrap();

        assert_eq!(a.id, b.id);
        assert!(a.is_unknown());
        assert_eq!(a.name, UNKNOWN_ARTIST_NAME);
        assert_eq!(session.artists().count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_rejects_empty_name() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let err = session.artists().upsert(&artist("1", "  ")).await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput { .. }));
    }

    #[core_async::test]
    async fn test_delete_artist() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let stored = session.artists().upsert(&artist("3", "Plaid")).await.unwrap();
        assert!(session.artists().delete(stored.id).await.unwrap());
        assert!(!session.artists().delete(stored.id).await.unwrap());
        assert!(session.artists().find_by_id(stored.id).await.unwrap().is_none());
    }
}
