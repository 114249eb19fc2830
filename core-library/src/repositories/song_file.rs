//! Downloaded song bytes

use crate::error::Result;
use crate::models::SongFile;
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

pub struct SongFileRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> SongFileRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    /// Store (or overwrite) the file of a song.
    pub async fn store(
        &mut self,
        song_id: i64,
        data: &[u8],
        content_type: Option<&str>,
        now: i64,
    ) -> Result<()> {
        query(
            r#"
            INSERT INTO song_files (song_id, data, content_type, stored_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(song_id) DO UPDATE SET
                data = excluded.data,
                content_type = excluded.content_type,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(song_id)
        .bind(data)
        .bind(content_type)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        self.changes.touch("song_files");
        Ok(())
    }

    pub async fn find(&mut self, song_id: i64) -> Result<Option<SongFile>> {
        let file = query_as::<_, SongFile>("SELECT * FROM song_files WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(file)
    }

    pub async fn delete_all(&mut self) -> Result<u64> {
        let result = query("DELETE FROM song_files")
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() > 0 {
            self.changes.touch("song_files");
        }
        Ok(result.rows_affected())
    }
}
