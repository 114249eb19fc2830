//! # Download Request Manager
//!
//! The persisted FIFO queue of byte fetches. One row per [`Downloadable`]
//! (keyed by its `unique_id`); enqueueing an object that already has a row
//! is a no-op whatever the row's state.
//!
//! Every query and bulk operation is narrowed to the manager's
//! [`DownloadScope`]. Dates are Unix milliseconds from the injected clock.

use crate::downloadable::{DownloadScope, Downloadable};
use crate::error::Result;
use bridge_traits::{Clock, SystemClock};
use core_async::sync::Notify;
use core_library::models::{DownloadErrorKind, DownloadRecord, DownloadState, NewDownload};
use core_library::LibraryStore;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct DownloadRequestManager {
    store: LibraryStore,
    scope: DownloadScope,
    events: EventBus,
    clock: Arc<dyn Clock>,
    /// Poked whenever new work is queued
    wakeup: Arc<Notify>,
}

impl DownloadRequestManager {
    pub fn new(store: LibraryStore, scope: DownloadScope, events: EventBus) -> Self {
        Self {
            store,
            scope,
            events,
            clock: Arc::new(SystemClock),
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scope(&self) -> DownloadScope {
        self.scope
    }

    pub(crate) fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub(crate) fn wakeup(&self) -> &Arc<Notify> {
        &self.wakeup
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Queue one object. Returns whether a row was created.
    #[instrument(skip_all, fields(id = %item.unique_id()))]
    pub async fn add(&self, item: &dyn Downloadable) -> Result<bool> {
        Ok(self.add_many(&[item]).await? == 1)
    }

    /// Queue several objects in one session. Returns how many rows were
    /// created; objects already queued (in any state) are skipped.
    #[instrument(skip_all, fields(count = items.len()))]
    pub async fn add_many(&self, items: &[&dyn Downloadable]) -> Result<u64> {
        let now = self.now();
        let mut session = self.store.begin().await?;
        let mut created = Vec::new();

        for item in items {
            let download = NewDownload {
                id: item.unique_id(),
                kind: item.download_kind(),
                element_id: item.element_id(),
                url: item.download_url(),
                creation_date: now,
            };
            if session.downloads().insert_if_absent(&download).await? {
                created.push(download);
            } else {
                debug!(id = %download.id, "Already queued");
            }
        }
        session.save().await?;

        for download in &created {
            self.emit(DownloadEvent::Queued {
                download_id: download.id.clone(),
                kind: download.kind.to_string(),
            });
        }
        if !created.is_empty() {
            self.wakeup.notify_waiters();
        }
        Ok(created.len() as u64)
    }

    /// Claim the oldest eligible row in scope. The row is flagged as
    /// downloading in the same session, so concurrent callers never get the
    /// same row.
    pub async fn get_next_request_to_download(&self) -> Result<Option<DownloadRecord>> {
        let mut session = self.store.begin().await?;
        let record = session
            .downloads()
            .claim_next(self.scope.kind_filter())
            .await?;
        session.save().await?;
        Ok(record)
    }

    pub async fn mark_started(&self, id: &str) -> Result<bool> {
        let now = self.now();
        let mut session = self.store.begin().await?;
        let updated = session.downloads().mark_started(id, now).await?;
        session.save().await?;
        Ok(updated)
    }

    pub async fn mark_finished(&self, id: &str, attempts: u32) -> Result<bool> {
        let now = self.now();
        let mut session = self.store.begin().await?;
        let updated = session
            .downloads()
            .mark_finished(id, now, i64::from(attempts))
            .await?;
        session.save().await?;
        Ok(updated)
    }

    pub async fn mark_errored(
        &self,
        id: &str,
        kind: DownloadErrorKind,
        attempts: u32,
    ) -> Result<bool> {
        let now = self.now();
        let mut session = self.store.begin().await?;
        let updated = session
            .downloads()
            .mark_errored(id, now, kind, i64::from(attempts))
            .await?;
        session.save().await?;
        Ok(updated)
    }

    /// Release a canceled row a worker was holding.
    pub async fn mark_canceled_observed(&self, id: &str) -> Result<bool> {
        let mut session = self.store.begin().await?;
        let updated = session.downloads().mark_canceled_observed(id).await?;
        session.save().await?;
        Ok(updated)
    }

    /// Cancel one unfinished row. Returns `false` when the row is unknown,
    /// out of scope or already done.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let mut session = self.store.begin().await?;
        let in_scope = match session.downloads().find(id).await? {
            Some(record) => self.scope.contains(record.kind),
            None => false,
        };
        let canceled = in_scope && session.downloads().cancel_one(id).await?;
        session.save().await?;
        Ok(canceled)
    }

    /// Delete finished, errored and canceled rows so their objects can be
    /// queued again.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn clear_finished_downloads(&self) -> Result<u64> {
        let mut session = self.store.begin().await?;
        let removed = session
            .downloads()
            .clear_finished(self.scope.kind_filter())
            .await?;
        session.save().await?;
        info!(removed, "Cleared finished downloads");
        Ok(removed)
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn clear_all_downloads(&self) -> Result<u64> {
        let mut session = self.store.begin().await?;
        let removed = session
            .downloads()
            .clear_all(self.scope.kind_filter())
            .await?;
        session.save().await?;
        info!(removed, "Cleared download queue");
        Ok(removed)
    }

    /// Return rows interrupted mid-download to the queue.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn reset_started_downloads(&self) -> Result<u64> {
        let mut session = self.store.begin().await?;
        let reset = session
            .downloads()
            .reset_started(self.scope.kind_filter())
            .await?;
        session.save().await?;
        if reset > 0 {
            info!(reset, "Requeued interrupted downloads");
        }
        Ok(reset)
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn cancel_downloads(&self) -> Result<u64> {
        let mut session = self.store.begin().await?;
        let canceled = session
            .downloads()
            .cancel_all(self.scope.kind_filter())
            .await?;
        session.save().await?;
        info!(canceled, "Canceled downloads");
        Ok(canceled)
    }

    pub async fn is_canceled(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some_and(|record| record.is_canceled))
    }

    /// `None` for unknown and out-of-scope ids.
    pub async fn get(&self, id: &str) -> Result<Option<DownloadRecord>> {
        let record = self.store.reader().download(id).await?;
        Ok(record.filter(|r| self.scope.contains(r.kind)))
    }

    /// Rows still waiting for a worker.
    pub async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .store
            .reader()
            .pending_download_count(self.scope.kind_filter())
            .await?)
    }

    /// Rows in FIFO order, optionally only those in `state`.
    pub async fn list(&self, state: Option<DownloadState>) -> Result<Vec<DownloadRecord>> {
        Ok(self
            .store
            .reader()
            .downloads(self.scope.kind_filter(), state)
            .await?)
    }

    pub(crate) fn emit(&self, event: DownloadEvent) {
        self.events.emit(CoreEvent::Download(event)).ok();
    }
}

impl std::fmt::Debug for DownloadRequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequestManager")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use core_library::models::DownloadKind;

    struct Item {
        id: &'static str,
        kind: DownloadKind,
    }

    impl Downloadable for Item {
        fn unique_id(&self) -> String {
            self.id.to_string()
        }

        fn download_kind(&self) -> DownloadKind {
            self.kind
        }

        fn element_id(&self) -> i64 {
            1
        }

        fn download_url(&self) -> Option<String> {
            Some(format!("https://music.test/{}", self.id))
        }
    }

    async fn manager(scope: DownloadScope) -> DownloadRequestManager {
        let store = LibraryStore::open_in_memory().await.unwrap();
        DownloadRequestManager::new(store, scope, EventBus::new(32))
            .with_clock(Arc::new(ManualClock::starting_at(1_000)))
    }

    #[core_async::test]
    async fn test_add_reports_creation_once() {
        let manager = manager(DownloadScope::All).await;
        let item = Item {
            id: "song-1",
            kind: DownloadKind::Song,
        };

        assert!(manager.add(&item).await.unwrap());
        assert!(!manager.add(&item).await.unwrap());
        assert_eq!(manager.pending_count().await.unwrap(), 1);

        let record = manager.get("song-1").await.unwrap().unwrap();
        assert_eq!(record.creation_date, 1_000);
        assert_eq!(record.url.as_deref(), Some("https://music.test/song-1"));
    }

    #[core_async::test]
    async fn test_add_emits_queued_only_for_new_rows() {
        let manager = manager(DownloadScope::All).await;
        let mut events = manager.events.subscribe();
        let first = Item {
            id: "song-1",
            kind: DownloadKind::Song,
        };
        let second = Item {
            id: "artwork-1",
            kind: DownloadKind::Artwork,
        };

        assert_eq!(manager.add_many(&[&first, &second]).await.unwrap(), 2);
        assert_eq!(manager.add_many(&[&first]).await.unwrap(), 0);

        let mut queued = Vec::new();
        while let Ok(CoreEvent::Download(DownloadEvent::Queued { download_id, .. })) =
            events.try_recv()
        {
            queued.push(download_id);
        }
        assert_eq!(queued, vec!["song-1", "artwork-1"]);
    }

    #[core_async::test]
    async fn test_get_hides_rows_outside_scope() {
        let all = manager(DownloadScope::All).await;
        let artwork_only = DownloadRequestManager::new(
            all.store.clone(),
            DownloadScope::Kind(DownloadKind::Artwork),
            EventBus::new(8),
        );
        all.add(&Item {
            id: "song-1",
            kind: DownloadKind::Song,
        })
        .await
        .unwrap();

        assert!(artwork_only.get("song-1").await.unwrap().is_none());
        assert!(!artwork_only.cancel("song-1").await.unwrap());
        assert!(artwork_only
            .get_next_request_to_download()
            .await
            .unwrap()
            .is_none());
        assert!(all.cancel("song-1").await.unwrap());
        assert!(all.is_canceled("song-1").await.unwrap());
    }
}
