//! # Library Store and Write Sessions
//!
//! [`LibraryStore`] owns the pool and a single writer lock for the physical
//! database. Every write goes through a [`LibraryStorage`] session obtained
//! from [`LibraryStore::begin`]: the session holds the writer lock and one
//! SQLite transaction until it is saved or dropped.
//!
//! ```text
//!  foreground task ──begin()──┐
//!                             ├──> writer lock ──> BEGIN … COMMIT
//!  background sync ──begin()──┘        (one session at a time)
//!
//!  views ──reader()──> pool (WAL, concurrent with the session)
//! ```
//!
//! A session must not be used across tasks, and the task holding a session
//! must not wait on [`LibraryReader`] queries: on a single-connection
//! in-memory store the reader would wait for the session's connection.

use crate::db::{create_pool, DatabaseConfig};
use crate::error::Result;
use crate::reader::LibraryReader;
use crate::repositories::{
    AlbumRepository, ArtistRepository, ArtworkRepository, ChangeSet, DownloadRepository,
    GenreRepository, PlaylistRepository, PodcastRepository, SongFileRepository, SongRepository,
    SyncWaveRepository,
};
use core_async::sync::{Mutex, OwnedMutexGuard};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Handle to the persisted library. Cheap to clone; clones share the pool
/// and the writer lock.
#[derive(Clone)]
pub struct LibraryStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
    events: Option<EventBus>,
}

impl LibraryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
            events: None,
        }
    }

    /// Open (and migrate) the database described by `config`.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Publish `LibraryEvent`s on `events` after every committed session.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn reader(&self) -> LibraryReader {
        LibraryReader::new(self.pool.clone())
    }

    /// Open a write session, waiting for the writer lock.
    pub async fn begin(&self) -> Result<LibraryStorage> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await?;

        Ok(LibraryStorage {
            tx,
            changes: ChangeSet::default(),
            events: self.events.clone(),
            _writer: writer,
        })
    }
}

impl std::fmt::Debug for LibraryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryStore")
            .field("pool_size", &self.pool.size())
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// An open write session.
///
/// Commits with [`save`](Self::save); dropping it rolls the transaction back
/// and releases the writer lock.
pub struct LibraryStorage {
    // Field order matters: the transaction rolls back before the lock is freed.
    tx: Transaction<'static, Sqlite>,
    changes: ChangeSet,
    events: Option<EventBus>,
    _writer: OwnedMutexGuard<()>,
}

impl LibraryStorage {
    pub fn artists(&mut self) -> ArtistRepository<'_> {
        ArtistRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn albums(&mut self) -> AlbumRepository<'_> {
        AlbumRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn songs(&mut self) -> SongRepository<'_> {
        SongRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn genres(&mut self) -> GenreRepository<'_> {
        GenreRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn playlists(&mut self) -> PlaylistRepository<'_> {
        PlaylistRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn podcasts(&mut self) -> PodcastRepository<'_> {
        PodcastRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn artworks(&mut self) -> ArtworkRepository<'_> {
        ArtworkRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn sync_waves(&mut self) -> SyncWaveRepository<'_> {
        SyncWaveRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn downloads(&mut self) -> DownloadRepository<'_> {
        DownloadRepository::new(&mut self.tx, &mut self.changes)
    }

    pub fn song_files(&mut self) -> SongFileRepository<'_> {
        SongFileRepository::new(&mut self.tx, &mut self.changes)
    }

    /// Tables written so far in this session.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Delete downloaded song files and cached artwork bytes. Custom artwork
    /// goes back to `NotChecked` so the artwork sync fetches it again.
    pub async fn clear_cached_files(&mut self) -> Result<(u64, u64)> {
        let files = self.song_files().delete_all().await?;
        let images = self.artworks().clear_cached_images().await?;
        self.changes.mark_cache_cleared();
        debug!(files, images, "Cleared cached files");
        Ok((files, images))
    }

    /// Commit and notify subscribers.
    #[instrument(skip_all)]
    pub async fn save(self) -> Result<()> {
        let LibraryStorage {
            tx,
            changes,
            events,
            _writer,
        } = self;

        tx.commit().await?;
        drop(_writer);

        if let Some(events) = events.filter(|_| !changes.is_empty()) {
            if !changes.entities().is_empty() {
                events
                    .emit(CoreEvent::Library(LibraryEvent::Changed {
                        entities: changes.entities(),
                    }))
                    .ok();
            }
            if changes.cache_cleared() {
                events.emit(CoreEvent::Library(LibraryEvent::CacheCleared)).ok();
            }
        }
        Ok(())
    }

    /// Roll back explicitly. Equivalent to dropping the session, but waits
    /// for the rollback to finish.
    pub async fn discard(self) -> Result<()> {
        let LibraryStorage { tx, _writer, .. } = self;
        tx.rollback().await?;
        Ok(())
    }
}
