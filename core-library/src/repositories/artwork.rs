//! Artwork repository
//!
//! Artwork rows are shared: artists, albums, songs and podcasts point at them
//! through `artwork_id`. Identity is `(artwork_type, artwork_remote_id)` when
//! the URL could be parsed, otherwise the URL itself.

use crate::error::{LibraryError, Result};
use crate::models::{Artwork, ArtworkKey, ArtworkStatus, ARTWORK_OWNER_TABLES};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "artworks";

pub struct ArtworkRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> ArtworkRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Artwork>> {
        let artwork = query_as::<_, Artwork>("SELECT * FROM artworks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(artwork)
    }

    pub async fn find_by_key(&mut self, key: &ArtworkKey) -> Result<Option<Artwork>> {
        let artwork = query_as::<_, Artwork>(
            "SELECT * FROM artworks WHERE artwork_type = ? AND artwork_remote_id = ?",
        )
        .bind(&key.artwork_type)
        .bind(&key.remote_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(artwork)
    }

    /// Oldest row with this URL.
    pub async fn find_by_url(&mut self, url: &str) -> Result<Option<Artwork>> {
        let artwork =
            query_as::<_, Artwork>("SELECT * FROM artworks WHERE url = ? ORDER BY id LIMIT 1")
                .bind(url)
                .fetch_optional(&mut *self.conn)
                .await?;
        Ok(artwork)
    }

    /// Look up the artwork by key (or by URL when there is no key) and create
    /// it as `NotChecked` when missing. A keyed row whose URL changed gets the
    /// new URL.
    pub async fn ensure(&mut self, url: &str, key: Option<&ArtworkKey>) -> Result<Artwork> {
        if url.trim().is_empty() {
            return Err(LibraryError::invalid("Artwork", "url cannot be empty"));
        }

        let existing = match key {
            Some(key) => self.find_by_key(key).await?,
            None => self.find_by_url(url).await?,
        };

        if let Some(mut artwork) = existing {
            if artwork.url != url {
                query("UPDATE artworks SET url = ? WHERE id = ?")
                    .bind(url)
                    .bind(artwork.id)
                    .execute(&mut *self.conn)
                    .await?;
                artwork.url = url.to_string();
                self.changes.touch(TABLE);
            }
            return Ok(artwork);
        }

        let artwork = query_as::<_, Artwork>(
            r#"
            INSERT INTO artworks (url, status, artwork_type, artwork_remote_id)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(url)
        .bind(ArtworkStatus::NotChecked)
        .bind(key.map(|k| k.artwork_type.as_str()))
        .bind(key.map(|k| k.remote_id.as_str()))
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch(TABLE);
        Ok(artwork)
    }

    /// Every artwork row, ascending id.
    pub async fn all_ordered(&mut self) -> Result<Vec<Artwork>> {
        let rows = query_as::<_, Artwork>("SELECT * FROM artworks ORDER BY id")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    /// Record a fetch result. Bytes are kept only for `CustomImage`.
    pub async fn set_status(
        &mut self,
        id: i64,
        status: ArtworkStatus,
        image_data: Option<&[u8]>,
        now: i64,
    ) -> Result<()> {
        let image_data = match status {
            ArtworkStatus::CustomImage => image_data,
            _ => None,
        };

        let result = query(
            "UPDATE artworks SET status = ?, image_data = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(image_data)
        .bind(now)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Artwork", id));
        }
        self.changes.touch(TABLE);
        Ok(())
    }

    pub async fn stamp_key(&mut self, id: i64, key: &ArtworkKey) -> Result<()> {
        query("UPDATE artworks SET artwork_type = ?, artwork_remote_id = ? WHERE id = ?")
            .bind(&key.artwork_type)
            .bind(&key.remote_id)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        self.changes.touch(TABLE);
        Ok(())
    }

    /// Point every owner of `from` at `to`. Returns the number of owner rows
    /// changed across all owner tables.
    pub async fn repoint_owners(&mut self, from: i64, to: i64) -> Result<u64> {
        let mut repointed = 0;
        for table in ARTWORK_OWNER_TABLES {
            let sql = format!("UPDATE {table} SET artwork_id = ? WHERE artwork_id = ?");
            let result = query(&sql)
                .bind(to)
                .bind(from)
                .execute(&mut *self.conn)
                .await?;
            if result.rows_affected() > 0 {
                self.changes.touch(table);
            }
            repointed += result.rows_affected();
        }
        Ok(repointed)
    }

    /// Owners' references become NULL through the foreign keys.
    pub async fn delete(&mut self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM artworks WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected() > 0)
    }

    /// Drop stored image bytes; the rows go back to `NotChecked`.
    pub async fn clear_cached_images(&mut self) -> Result<u64> {
        let result = query(
            "UPDATE artworks SET image_data = NULL, status = ? WHERE status = ? OR image_data IS NOT NULL",
        )
        .bind(ArtworkStatus::NotChecked)
        .bind(ArtworkStatus::CustomImage)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected())
    }

    pub async fn count(&mut self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM artworks")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewArtist;
    use crate::storage::LibraryStore;

    #[core_async::test]
    async fn test_ensure_by_key_updates_url() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();
        let key = ArtworkKey::new("album", "42");

        let first = session
            .artworks()
            .ensure("https://h/image.php?object_type=album&object_id=42&auth=a", Some(&key))
            .await
            .unwrap();
        let second = session
            .artworks()
            .ensure("https://h/image.php?object_type=album&object_id=42&auth=b", Some(&key))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.url.ends_with("auth=b"));
        assert_eq!(second.status, ArtworkStatus::NotChecked);
        assert_eq!(session.artworks().count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_only_custom_images_keep_bytes() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let art = session.artworks().ensure("https://h/a.png", None).await.unwrap();
        session
            .artworks()
            .set_status(art.id, ArtworkStatus::IsDefaultImage, Some(b"png"), 5)
            .await
            .unwrap();
        let stored = session.artworks().find_by_id(art.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArtworkStatus::IsDefaultImage);
        assert!(stored.image_data.is_none());

        session
            .artworks()
            .set_status(art.id, ArtworkStatus::CustomImage, Some(b"png"), 6)
            .await
            .unwrap();
        let stored = session.artworks().find_by_id(art.id).await.unwrap().unwrap();
        assert_eq!(stored.image_data.as_deref(), Some(&b"png"[..]));

        assert_eq!(session.artworks().clear_cached_images().await.unwrap(), 1);
        let stored = session.artworks().find_by_id(art.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArtworkStatus::NotChecked);
        assert!(stored.image_data.is_none());
    }

    #[core_async::test]
    async fn test_repoint_and_delete_owner_references() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let mut session = store.begin().await.unwrap();

        let keep = session.artworks().ensure("https://h/1.png", None).await.unwrap();
        let dup = session.artworks().ensure("https://h/2.png", None).await.unwrap();
        let gone = session.artworks().ensure("https://h/3.png", None).await.unwrap();

        let a = session
            .artists()
            .upsert(&NewArtist {
                remote_id: "1".to_string(),
                name: "Seefeel".to_string(),
                artwork_id: Some(dup.id),
                ..NewArtist::default()
            })
            .await
            .unwrap();
        let b = session
            .artists()
            .upsert(&NewArtist {
                remote_id: "2".to_string(),
                name: "Mouse on Mars".to_string(),
                artwork_id: Some(gone.id),
                ..NewArtist::default()
            })
            .await
            .unwrap();

        assert_eq!(session.artworks().repoint_owners(dup.id, keep.id).await.unwrap(), 1);
        assert!(session.artworks().delete(gone.id).await.unwrap());

        let a = session.artists().find_by_id(a.id).await.unwrap().unwrap();
        let b = session.artists().find_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(a.artwork_id, Some(keep.id));
        assert_eq!(b.artwork_id, None);
    }
}
