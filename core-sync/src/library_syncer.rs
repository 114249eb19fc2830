//! # Library Syncer
//!
//! Pulls the remote catalog into the library store in resumable waves.
//!
//! ## Waves
//!
//! A [`SyncWave`] walks `Artists → Albums → Songs → Done`. Each loop
//! iteration fetches one page at the wave's offset (outside any session),
//! then opens one session that upserts the page and persists the advanced
//! offset, so a crash between pages loses nothing and repeats nothing. An
//! empty page moves the wave to the next phase at offset 0.
//!
//! ## Full vs incremental
//!
//! - [`sync`](LibrarySyncer::sync) creates a new wave with no lower bound,
//!   then refreshes genres, playlists and podcasts. The wave only reaches
//!   `Done` once podcasts are stored, so a run that fails after the songs
//!   phase is picked up again by the next incremental pass.
//! - [`sync_in_background`](LibrarySyncer::sync_in_background) resumes an
//!   unfinished wave, or starts a new one bounded by the previous wave's last
//!   add when the server reports newer additions, or does nothing.
//!
//! ## Cancellation
//!
//! The caller's token and [`stop`](LibrarySyncer::stop) are checked at every
//! loop head. A cancelled run returns [`SyncError::Interrupted`] and leaves
//! the wave resumable.

use crate::control::{RunControl, RunToken};
use crate::error::{Result, SyncError};
use crate::reconcile::Reconciler;
use crate::remote::{
    LibraryMetadata, PageQuery, RemoteAlbum, RemoteArtist, RemoteCatalog, RemoteSong,
};
use bridge_traits::{Clock, SystemClock};
use core_async::sync::CancellationToken;
use core_async::time::Instant;
use core_library::models::{SyncState, SyncWave, WaveKind};
use core_library::{LibraryStorage, LibraryStore};
use core_runtime::config::{PageErrorPolicy, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What an incremental pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementalOutcome {
    /// No wave exists yet; a full sync has to run first
    NotInitialized,
    /// An unfinished wave was driven to completion
    Resumed { wave_id: i64, items_processed: u64 },
    /// The server reported newer additions; a bounded wave was run
    NewWave { wave_id: i64, items_processed: u64 },
    UpToDate,
}

/// Result of a full sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub wave_id: i64,
    pub items_processed: u64,
    pub genres: usize,
    pub playlists: usize,
    pub podcasts: usize,
}

/// Identifies one invocation in emitted events.
struct Run {
    id: String,
    kind: &'static str,
    started: Instant,
}

impl Run {
    fn new(kind: &'static str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            started: Instant::now(),
        }
    }
}

/// One fetched page of the phase being synced.
enum RemotePage {
    Artists(Vec<RemoteArtist>),
    Albums(Vec<RemoteAlbum>),
    Songs(Vec<RemoteSong>),
}

impl RemotePage {
    fn empty(phase: SyncState) -> Self {
        match phase {
            SyncState::Artists => RemotePage::Artists(Vec::new()),
            SyncState::Albums => RemotePage::Albums(Vec::new()),
            SyncState::Songs | SyncState::Done => RemotePage::Songs(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            RemotePage::Artists(items) => items.len(),
            RemotePage::Albums(items) => items.len(),
            RemotePage::Songs(items) => items.len(),
        }
    }

    async fn apply(
        &self,
        reconciler: &mut Reconciler<'_>,
        session: &mut LibraryStorage,
    ) -> Result<()> {
        match self {
            RemotePage::Artists(items) => {
                for artist in items {
                    reconciler.artist(session, artist).await?;
                }
            }
            RemotePage::Albums(items) => {
                for album in items {
                    reconciler.album(session, album).await?;
                }
            }
            RemotePage::Songs(items) => {
                for song in items {
                    reconciler.song(session, song).await?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct LibrarySyncer {
    store: LibraryStore,
    catalog: Arc<dyn RemoteCatalog>,
    settings: SyncSettings,
    events: EventBus,
    clock: Arc<dyn Clock>,
    control: Arc<RunControl>,
}

impl LibrarySyncer {
    pub fn new(
        store: LibraryStore,
        catalog: Arc<dyn RemoteCatalog>,
        settings: SyncSettings,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
            events,
            clock: Arc::new(SystemClock),
            control: RunControl::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn RemoteCatalog> {
        &self.catalog
    }

    /// Whether any operation of this syncer (or a clone) is in flight.
    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Cancel every run in flight. Calls made afterwards are unaffected.
    pub async fn stop(&self) {
        self.control.stop().await;
    }

    /// [`stop`](Self::stop), then wait until no operation is in flight.
    pub async fn stop_and_wait(&self) {
        self.control.stop_and_wait().await;
        debug!("Library syncer drained");
    }

    // ------------------------------------------------------------------
    // Full and incremental sync
    // ------------------------------------------------------------------

    /// Full sync: a new unbounded wave plus genres, playlists and podcasts.
    #[instrument(skip_all)]
    pub async fn sync(&self, token: &CancellationToken) -> Result<SyncSummary> {
        let (_active, token) = self.control.begin_run(token).await;
        let run = Run::new("full");
        let result = self.sync_inner(&run, &token).await;
        self.report(
            &run,
            result.as_ref().ok().map(|s| s.wave_id),
            result.as_ref().map(|s| s.items_processed),
        );
        result
    }

    async fn sync_inner(&self, run: &Run, token: &RunToken) -> Result<SyncSummary> {
        let metadata = self.catalog.library_metadata().await?;
        let mut wave = self.create_wave(WaveKind::Library, &metadata, None).await?;
        self.emit_started(run, Some(wave.id));
        info!(wave_id = wave.id, "Full library sync started");

        let genres = self.sync_genres().await?;
        let items_processed = self.drive_wave(&mut wave, run, token, false).await?;
        let (playlists, podcasts) = self.sync_wave_extras(token, items_processed).await?;
        self.complete_wave(&mut wave).await?;

        Ok(SyncSummary {
            wave_id: wave.id,
            items_processed,
            genres,
            playlists,
            podcasts,
        })
    }

    /// Playlists with their items, then podcasts; the tail of a full sync.
    async fn sync_wave_extras(
        &self,
        token: &RunToken,
        items_processed: u64,
    ) -> Result<(usize, usize)> {
        let mut playlists = 0;
        for playlist in self.sync_down_playlists().await? {
            if token.is_cancelled() {
                return Err(SyncError::Interrupted { items_processed });
            }
            if let Some(remote_id) = playlist.remote_id.as_deref() {
                self.pull_playlist_items(playlist.id, remote_id).await?;
            }
            playlists += 1;
        }

        if token.is_cancelled() {
            return Err(SyncError::Interrupted { items_processed });
        }
        let podcasts = self.sync_podcasts().await?;
        Ok((playlists, podcasts))
    }

    /// Move a wave whose songs phase is exhausted to `Done`.
    async fn complete_wave(&self, wave: &mut SyncWave) -> Result<()> {
        wave.sync_state = SyncState::Done;
        wave.sync_index_to_continue = 0;
        wave.completed_at = Some(self.clock.unix_timestamp());

        let mut session = self.store.begin().await?;
        session.sync_waves().save_progress(wave).await?;
        session.save().await?;
        debug!(wave_id = wave.id, "Wave done");
        Ok(())
    }

    /// Incremental pass; see [`IncrementalOutcome`].
    #[instrument(skip_all)]
    pub async fn sync_in_background(
        &self,
        token: &CancellationToken,
    ) -> Result<IncrementalOutcome> {
        let (_active, token) = self.control.begin_run(token).await;
        let run = Run::new("incremental");
        let result = self.incremental_inner(&run, &token).await;

        // No-op passes stay silent.
        match &result {
            Ok(
                IncrementalOutcome::Resumed {
                    wave_id,
                    items_processed,
                }
                | IncrementalOutcome::NewWave {
                    wave_id,
                    items_processed,
                },
            ) => self.report(&run, Some(*wave_id), Ok(*items_processed)),
            Ok(IncrementalOutcome::NotInitialized | IncrementalOutcome::UpToDate) => {}
            Err(e) => self.report(&run, None, Err(e)),
        }
        result
    }

    async fn incremental_inner(
        &self,
        run: &Run,
        token: &RunToken,
    ) -> Result<IncrementalOutcome> {
        let Some(mut latest) = self.store.reader().latest_wave(WaveKind::Library).await? else {
            debug!("No library wave yet; incremental sync skipped");
            return Ok(IncrementalOutcome::NotInitialized);
        };

        if !latest.is_done() {
            info!(
                wave_id = latest.id,
                phase = %latest.sync_state,
                offset = latest.sync_index_to_continue,
                "Resuming unfinished wave"
            );
            self.emit_started(run, Some(latest.id));
            let items_processed = if latest.added_after.is_none() {
                // An unbounded wave belongs to a full sync that stopped
                // before its playlists and podcasts were stored.
                let items = self.drive_wave(&mut latest, run, token, false).await?;
                self.sync_wave_extras(token, items).await?;
                self.complete_wave(&mut latest).await?;
                items
            } else {
                self.drive_wave(&mut latest, run, token, true).await?
            };
            return Ok(IncrementalOutcome::Resumed {
                wave_id: latest.id,
                items_processed,
            });
        }

        let metadata = self.catalog.library_metadata().await?;
        let last_add = latest.date_of_last_add;
        if metadata.change_dates.date_of_last_add <= last_add {
            debug!(last_add, "Library is up to date");
            return Ok(IncrementalOutcome::UpToDate);
        }

        let mut wave = self
            .create_wave(WaveKind::Library, &metadata, Some(last_add + 1))
            .await?;
        info!(
            wave_id = wave.id,
            added_after = last_add + 1,
            "New additions on server; starting bounded wave"
        );
        self.emit_started(run, Some(wave.id));
        let items_processed = self.drive_wave(&mut wave, run, token, true).await?;
        Ok(IncrementalOutcome::NewWave {
            wave_id: wave.id,
            items_processed,
        })
    }

    /// Drive `wave` from its stored phase and offset to `Done`.
    #[instrument(skip_all, fields(wave_id = wave.id))]
    pub async fn resync(&self, wave: &mut SyncWave, token: &CancellationToken) -> Result<u64> {
        let (_active, token) = self.control.begin_run(token).await;
        let run = Run::new("resync");
        self.emit_started(&run, Some(wave.id));
        let result = self.drive_wave(wave, &run, &token, true).await;
        self.report(&run, Some(wave.id), result.as_ref().copied());
        result
    }

    /// Create and persist a fresh wave of `kind` in the `Artists` phase.
    pub async fn create_wave(
        &self,
        kind: WaveKind,
        metadata: &LibraryMetadata,
        added_after: Option<i64>,
    ) -> Result<SyncWave> {
        let mut session = self.store.begin().await?;
        let wave = session
            .sync_waves()
            .create(
                kind,
                metadata.change_dates,
                added_after,
                self.clock.unix_timestamp(),
            )
            .await?;
        session.artists().ensure_unknown_artist().await?;
        session.save().await?;
        Ok(wave)
    }

    /// Page through the wave's phases. With `finish` unset the wave is left
    /// in `Songs` once that phase runs dry, for the caller to complete.
    async fn drive_wave(
        &self,
        wave: &mut SyncWave,
        run: &Run,
        token: &RunToken,
        finish: bool,
    ) -> Result<u64> {
        let parser = self.catalog.artwork_url_parser();
        let mut reconciler = Reconciler::new(parser.as_ref());
        let mut items_processed = 0u64;

        loop {
            if token.is_cancelled() {
                info!(
                    wave_id = wave.id,
                    phase = %wave.sync_state,
                    offset = wave.sync_index_to_continue,
                    "Wave interrupted"
                );
                return Err(SyncError::Interrupted { items_processed });
            }
            if wave.is_done() {
                return Ok(items_processed);
            }

            let phase = wave.sync_state;
            let page = self.fetch_page(wave).await?;
            let count = page.len();
            if count == 0 && phase == SyncState::Songs && !finish {
                return Ok(items_processed);
            }

            let mut session = self.store.begin().await?;
            if count == 0 {
                wave.advance_phase();
                if wave.is_done() {
                    wave.completed_at = Some(self.clock.unix_timestamp());
                }
                debug!(wave_id = wave.id, from = %phase, to = %wave.sync_state, "Phase exhausted");
            } else {
                page.apply(&mut reconciler, &mut session).await?;
                wave.sync_index_to_continue += count as i64;
            }
            session.sync_waves().save_progress(wave).await?;
            session.save().await?;

            items_processed += count as u64;
            self.emit(SyncEvent::Progress {
                run_id: run.id.clone(),
                phase: phase.to_string(),
                items_processed,
                offset: wave.sync_index_to_continue as u64,
            });
        }
    }

    async fn fetch_page(&self, wave: &SyncWave) -> Result<RemotePage> {
        let query = PageQuery {
            added_after: wave.added_after,
            start_index: wave.sync_index_to_continue.max(0) as u64,
            limit: self.settings.max_item_count_to_poll_at_once,
        };

        let fetched = match wave.sync_state {
            SyncState::Artists => self.catalog.artists(query).await.map(RemotePage::Artists),
            SyncState::Albums => self.catalog.albums(query).await.map(RemotePage::Albums),
            SyncState::Songs => self.catalog.songs(query).await.map(RemotePage::Songs),
            SyncState::Done => Ok(RemotePage::empty(SyncState::Done)),
        };

        match (fetched, self.settings.page_error_policy) {
            (Ok(page), _) => Ok(page),
            (Err(e), PageErrorPolicy::Abort) => Err(e.into()),
            (Err(e), PageErrorPolicy::TreatAsExhausted) => {
                warn!(
                    wave_id = wave.id,
                    phase = %wave.sync_state,
                    error = %e,
                    "Page request failed; treating phase as exhausted"
                );
                Ok(RemotePage::empty(wave.sync_state))
            }
        }
    }

    // ------------------------------------------------------------------
    // Genres
    // ------------------------------------------------------------------

    pub async fn sync_genres(&self) -> Result<usize> {
        let genres = self.catalog.genres().await?;
        if genres.is_empty() {
            return Ok(0);
        }

        let parser = self.catalog.artwork_url_parser();
        let mut reconciler = Reconciler::new(parser.as_ref());
        let mut session = self.store.begin().await?;
        for genre in &genres {
            reconciler.genre(&mut session, genre).await?;
        }
        session.save().await?;
        debug!(count = genres.len(), "Genres synced");
        Ok(genres.len())
    }

    // ------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------

    /// Upsert every remote playlist (names and counts, not items).
    #[instrument(skip_all)]
    pub async fn sync_down_playlists(&self) -> Result<Vec<core_library::models::Playlist>> {
        let _active = self.control.enter();
        let remote = self.catalog.playlists().await?;
        let now = self.clock.unix_timestamp();

        let mut session = self.store.begin().await?;
        let mut stored = Vec::with_capacity(remote.len());
        for playlist in &remote {
            stored.push(
                session
                    .playlists()
                    .upsert_remote(&playlist.id, &playlist.name, playlist.song_count, now)
                    .await?,
            );
        }
        session.save().await?;
        debug!(count = stored.len(), "Playlists synced");
        Ok(stored)
    }

    /// Replace the local items of `playlist_id` with the server's membership.
    /// A playlist that was never uploaded has nothing to pull.
    #[instrument(skip(self))]
    pub async fn sync_down_playlist(&self, playlist_id: i64) -> Result<usize> {
        let _active = self.control.enter();
        let playlist = self
            .store
            .reader()
            .playlist(playlist_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Playlist", playlist_id))?;

        match playlist.remote_id.as_deref() {
            Some(remote_id) => self.pull_playlist_items(playlist.id, remote_id).await,
            None => {
                debug!(playlist_id, "Playlist is local only; nothing to pull");
                Ok(0)
            }
        }
    }

    async fn pull_playlist_items(&self, playlist_id: i64, remote_id: &str) -> Result<usize> {
        let songs = self.catalog.playlist_songs(remote_id).await?;
        let parser = self.catalog.artwork_url_parser();
        let mut reconciler = Reconciler::new(parser.as_ref());

        let mut session = self.store.begin().await?;
        let mut song_ids = Vec::with_capacity(songs.len());
        for song in &songs {
            if let Some(stored) = reconciler.song(&mut session, song).await? {
                song_ids.push(stored.id);
            }
        }
        session.playlists().replace_items(playlist_id, &song_ids).await?;
        session.save().await?;
        Ok(song_ids.len())
    }

    /// Overwrite the server's copy of `playlist_id` with the local items.
    ///
    /// Creates the playlist remotely when it has no remote id yet. Existing
    /// remote entries are all removed (highest index first) and the local
    /// entries added in order; returns the number of entries added.
    #[instrument(skip(self))]
    pub async fn sync_upload_playlist(&self, playlist_id: i64) -> Result<usize> {
        let _active = self.control.enter();
        let reader = self.store.reader();
        let playlist = reader
            .playlist(playlist_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Playlist", playlist_id))?;
        let local_songs = reader.playlist_songs(playlist_id).await?;

        let remote_id = match playlist.remote_id {
            Some(remote_id) => {
                let remote_entries = self.catalog.playlist_songs(&remote_id).await?;
                for index in (0..remote_entries.len()).rev() {
                    self.catalog.remove_from_playlist(&remote_id, index).await?;
                }
                remote_id
            }
            None => {
                let remote_id = self.catalog.create_playlist(&playlist.name).await?;
                let mut session = self.store.begin().await?;
                session.playlists().set_remote_id(playlist.id, &remote_id).await?;
                session.save().await?;
                info!(playlist_id, %remote_id, "Playlist created on server");
                remote_id
            }
        };

        for song in &local_songs {
            self.catalog.add_to_playlist(&remote_id, &song.remote_id).await?;
        }
        Ok(local_songs.len())
    }

    /// Delete the playlist on the server (when it exists there) and locally.
    #[instrument(skip(self))]
    pub async fn delete_remote_playlist(&self, playlist_id: i64) -> Result<()> {
        let _active = self.control.enter();
        let playlist = self
            .store
            .reader()
            .playlist(playlist_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Playlist", playlist_id))?;

        if let Some(remote_id) = playlist.remote_id.as_deref() {
            self.catalog.delete_playlist(remote_id).await?;
        }

        let mut session = self.store.begin().await?;
        session.playlists().delete(playlist.id).await?;
        session.save().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Podcasts
    // ------------------------------------------------------------------

    /// Upsert every podcast; episodes are fetched per podcast on demand.
    #[instrument(skip_all)]
    pub async fn sync_podcasts(&self) -> Result<usize> {
        let _active = self.control.enter();
        let podcasts = self.catalog.podcasts().await?;
        if podcasts.is_empty() {
            return Ok(0);
        }

        let parser = self.catalog.artwork_url_parser();
        let mut reconciler = Reconciler::new(parser.as_ref());
        let mut session = self.store.begin().await?;
        let mut stored = 0;
        for podcast in &podcasts {
            if reconciler.podcast(&mut session, podcast).await?.is_some() {
                stored += 1;
            }
        }
        session.save().await?;
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn sync_podcast_episodes(&self, podcast_id: i64) -> Result<usize> {
        let _active = self.control.enter();
        let podcast = self
            .store
            .reader()
            .podcast(podcast_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Podcast", podcast_id))?;

        let episodes = self.catalog.podcast_episodes(&podcast.remote_id).await?;
        let parser = self.catalog.artwork_url_parser();
        let mut reconciler = Reconciler::new(parser.as_ref());
        let mut session = self.store.begin().await?;
        for episode in &episodes {
            reconciler.episode(&mut session, podcast.id, episode).await?;
        }
        session.save().await?;
        Ok(episodes.len())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn emit(&self, event: SyncEvent) {
        self.events.emit(CoreEvent::Sync(event)).ok();
    }

    fn emit_started(&self, run: &Run, wave_id: Option<i64>) {
        self.emit(SyncEvent::Started {
            run_id: run.id.clone(),
            kind: run.kind.to_string(),
            wave_id,
        });
    }

    fn report(
        &self,
        run: &Run,
        wave_id: Option<i64>,
        outcome: std::result::Result<u64, &SyncError>,
    ) {
        match outcome {
            Ok(items_processed) => {
                info!(run_id = %run.id, kind = run.kind, items_processed, "Sync run completed");
                self.emit(SyncEvent::Completed {
                    run_id: run.id.clone(),
                    kind: run.kind.to_string(),
                    wave_id,
                    items_processed,
                    duration_secs: run.started.elapsed().as_secs(),
                });
            }
            Err(SyncError::Interrupted { items_processed }) => {
                self.emit(SyncEvent::Cancelled {
                    run_id: run.id.clone(),
                    items_processed: *items_processed,
                });
            }
            Err(e) => {
                warn!(run_id = %run.id, kind = run.kind, error = %e, "Sync run failed");
                self.emit(SyncEvent::Failed {
                    run_id: run.id.clone(),
                    message: e.to_string(),
                    items_processed: 0,
                    recoverable: e.is_recoverable(),
                });
            }
        }
    }
}

impl std::fmt::Debug for LibrarySyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibrarySyncer")
            .field("settings", &self.settings)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
