//! Sync wave repository
//!
//! Waves are append-only; after creation only the phase, the offset and the
//! completion time change. The phase never moves backwards: an update that
//! would store a lower `sync_state` is rejected.

use crate::error::{LibraryError, Result};
use crate::models::{LibraryChangeDates, SyncState, SyncWave, WaveKind};
use crate::repositories::ChangeSet;
use sqlx::{query, query_as, SqliteConnection};

const TABLE: &str = "sync_waves";

pub struct SyncWaveRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> SyncWaveRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    /// A new wave in the `Artists` phase at offset 0.
    pub async fn create(
        &mut self,
        kind: WaveKind,
        dates: LibraryChangeDates,
        added_after: Option<i64>,
        now: i64,
    ) -> Result<SyncWave> {
        let wave = query_as::<_, SyncWave>(
            r#"
            INSERT INTO sync_waves (
                sync_state, sync_index_to_continue, date_of_last_add, date_of_last_update,
                date_of_last_clean, added_after, kind, created_at
            )
            VALUES (?, 0, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(SyncState::Artists)
        .bind(dates.date_of_last_add)
        .bind(dates.date_of_last_update)
        .bind(dates.date_of_last_clean)
        .bind(added_after)
        .bind(kind)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch(TABLE);
        Ok(wave)
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<SyncWave>> {
        let wave = query_as::<_, SyncWave>("SELECT * FROM sync_waves WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(wave)
    }

    pub async fn latest(&mut self, kind: WaveKind) -> Result<Option<SyncWave>> {
        let wave = query_as::<_, SyncWave>(
            "SELECT * FROM sync_waves WHERE kind = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(kind)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(wave)
    }

    /// Persist phase, offset and completion time.
    ///
    /// # Errors
    ///
    /// [`LibraryError::WaveRegression`] when the stored phase is later than
    /// `wave.sync_state`; [`LibraryError::NotFound`] for an unknown wave.
    pub async fn save_progress(&mut self, wave: &SyncWave) -> Result<()> {
        let result = query(
            r#"
            UPDATE sync_waves
            SET sync_state = ?1, sync_index_to_continue = ?2, completed_at = ?3
            WHERE id = ?4 AND sync_state <= ?1
            "#,
        )
        .bind(wave.sync_state)
        .bind(wave.sync_index_to_continue)
        .bind(wave.completed_at)
        .bind(wave.id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            let stored = self
                .find_by_id(wave.id)
                .await?
                .ok_or_else(|| LibraryError::not_found("SyncWave", wave.id))?;
            return Err(LibraryError::WaveRegression {
                wave_id: wave.id,
                stored: stored.sync_state.to_string(),
                requested: wave.sync_state.to_string(),
            });
        }

        self.changes.touch(TABLE);
        Ok(())
    }
}
