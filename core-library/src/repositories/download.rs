//! Download queue repository
//!
//! One row per downloadable (`id` is its unique id). Dates are Unix
//! milliseconds; FIFO order is `creation_date`, then insertion order.
//!
//! Bulk operations take an optional kind filter. `None` covers every kind.

use crate::error::Result;
use crate::models::{DownloadErrorKind, DownloadKind, DownloadRecord, NewDownload};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "downloads";

/// Rows a worker may pick up.
pub(crate) const ELIGIBLE: &str = "finish_date IS NULL AND error_date IS NULL \
     AND start_date IS NULL AND is_downloading = 0 AND is_canceled = 0";

pub struct DownloadRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> DownloadRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    /// Enqueue unless a row with the same id exists, whatever its state.
    /// Returns whether a row was created.
    pub async fn insert_if_absent(&mut self, download: &NewDownload) -> Result<bool> {
        let result = query(
            r#"
            INSERT INTO downloads (id, kind, element_id, url, creation_date)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&download.id)
        .bind(download.kind)
        .bind(download.element_id)
        .bind(&download.url)
        .bind(download.creation_date)
        .execute(&mut *self.conn)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            self.changes.touch(TABLE);
        }
        Ok(created)
    }

    pub async fn find(&mut self, id: &str) -> Result<Option<DownloadRecord>> {
        let record = query_as::<_, DownloadRecord>("SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(record)
    }

    /// Flag the oldest eligible row as downloading and return it.
    pub async fn claim_next(&mut self, kind: Option<DownloadKind>) -> Result<Option<DownloadRecord>> {
        let sql = format!(
            r#"
            UPDATE downloads SET is_downloading = 1
            WHERE id = (
                SELECT id FROM downloads
                WHERE {ELIGIBLE} AND (?1 IS NULL OR kind = ?1)
                ORDER BY creation_date, rowid
                LIMIT 1
            )
            RETURNING *
            "#
        );

        let record = query_as::<_, DownloadRecord>(&sql)
            .bind(kind)
            .fetch_optional(&mut *self.conn)
            .await?;

        if record.is_some() {
            self.changes.touch(TABLE);
        }
        Ok(record)
    }

    pub async fn mark_started(&mut self, id: &str, now: i64) -> Result<bool> {
        self.update_one(
            "UPDATE downloads SET start_date = ?, is_downloading = 1 WHERE id = ?",
            now,
            id,
        )
        .await
    }

    pub async fn mark_finished(&mut self, id: &str, now: i64, attempts: i64) -> Result<bool> {
        let result = query(
            r#"
            UPDATE downloads
            SET finish_date = ?, is_downloading = 0, attempts = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(attempts)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        self.touched(result.rows_affected())
    }

    pub async fn mark_errored(
        &mut self,
        id: &str,
        now: i64,
        kind: DownloadErrorKind,
        attempts: i64,
    ) -> Result<bool> {
        let result = query(
            r#"
            UPDATE downloads
            SET error_date = ?, error_kind = ?, is_downloading = 0, attempts = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(kind)
        .bind(attempts)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        self.touched(result.rows_affected())
    }

    /// A worker saw the cancel flag and dropped the fetched bytes.
    pub async fn mark_canceled_observed(&mut self, id: &str) -> Result<bool> {
        let result = query(
            "UPDATE downloads SET is_downloading = 0, error_kind = ? WHERE id = ? AND is_canceled = 1",
        )
        .bind(DownloadErrorKind::Canceled)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        self.touched(result.rows_affected())
    }

    pub async fn cancel_one(&mut self, id: &str) -> Result<bool> {
        let result = query(
            r#"
            UPDATE downloads SET is_canceled = 1
            WHERE id = ? AND finish_date IS NULL AND error_date IS NULL AND is_canceled = 0
            "#,
        )
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        self.touched(result.rows_affected())
    }

    /// Delete finished, errored and canceled rows. Canceled rows still held
    /// by a worker stay until the worker lets go of them.
    pub async fn clear_finished(&mut self, kind: Option<DownloadKind>) -> Result<u64> {
        self.bulk(
            r#"
            DELETE FROM downloads
            WHERE (finish_date IS NOT NULL
                   OR error_date IS NOT NULL
                   OR (is_canceled = 1 AND is_downloading = 0))
              AND (?1 IS NULL OR kind = ?1)
            "#,
            kind,
        )
        .await
    }

    pub async fn clear_all(&mut self, kind: Option<DownloadKind>) -> Result<u64> {
        self.bulk(
            "DELETE FROM downloads WHERE (?1 IS NULL OR kind = ?1)",
            kind,
        )
        .await
    }

    /// Return interrupted rows to the queue.
    pub async fn reset_started(&mut self, kind: Option<DownloadKind>) -> Result<u64> {
        self.bulk(
            r#"
            UPDATE downloads SET start_date = NULL, is_downloading = 0
            WHERE finish_date IS NULL AND error_date IS NULL
              AND (start_date IS NOT NULL OR is_downloading = 1)
              AND (?1 IS NULL OR kind = ?1)
            "#,
            kind,
        )
        .await
    }

    /// Flag every unfinished row as canceled.
    pub async fn cancel_all(&mut self, kind: Option<DownloadKind>) -> Result<u64> {
        self.bulk(
            r#"
            UPDATE downloads SET is_canceled = 1
            WHERE finish_date IS NULL AND error_date IS NULL AND is_canceled = 0
              AND (?1 IS NULL OR kind = ?1)
            "#,
            kind,
        )
        .await
    }

    pub async fn delete_for_element(&mut self, kind: DownloadKind, element_id: i64) -> Result<u64> {
        let result = query("DELETE FROM downloads WHERE kind = ? AND element_id = ?")
            .bind(kind)
            .bind(element_id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected())
    }

    async fn update_one(&mut self, sql: &str, now: i64, id: &str) -> Result<bool> {
        let result = query(sql)
            .bind(now)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        self.touched(result.rows_affected())
    }

    async fn bulk(&mut self, sql: &str, kind: Option<DownloadKind>) -> Result<u64> {
        let result = query(sql).bind(kind).execute(&mut *self.conn).await?;
        if result.rows_affected() > 0 {
            self.changes.touch(TABLE);
        }
        Ok(result.rows_affected())
    }

    fn touched(&mut self, rows: u64) -> Result<bool> {
        if rows > 0 {
            self.changes.touch(TABLE);
        }
        Ok(rows > 0)
    }
}
