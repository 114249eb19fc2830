//! # Download Manager
//!
//! Consumes one [`DownloadRequestManager`] scope. A supervisor task claims
//! rows while a semaphore permit is free and spawns one fetch per row:
//!
//! 1. mark started, emit `Started`
//! 2. fetch, retrying transient failures with exponential backoff
//! 3. in one session: re-read the row, drop the bytes if it was canceled,
//!    otherwise persist through the kind's [`DownloadSink`] and mark finished
//!
//! Idle supervisors sleep until `add` pokes them or the poll interval
//! passes. `start` first requeues rows a previous run left started.

use crate::error::{DownloadError, Result};
use crate::fetcher::{ArtworkSink, DownloadFetcher, DownloadSink, FetchedFile, SongFileSink};
use crate::request_manager::DownloadRequestManager;
use bridge_traits::RetryPolicy;
use core_async::sync::{CancellationToken, Mutex, Semaphore};
use core_async::task::{JoinHandle, JoinSet};
use core_async::time::{sleep, timeout, Duration};
use core_library::models::{DownloadErrorKind, DownloadKind, DownloadRecord};
use core_runtime::config::DownloadSettings;
use core_runtime::events::DownloadEvent;
use futures::future::select;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadManagerState {
    Idle,
    Running,
    Stopping,
}

struct Control {
    state: DownloadManagerState,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

#[derive(Clone)]
pub struct DownloadManager {
    requests: DownloadRequestManager,
    fetcher: Arc<dyn DownloadFetcher>,
    sinks: Arc<HashMap<DownloadKind, Arc<dyn DownloadSink>>>,
    max_concurrent: usize,
    retry: RetryPolicy,
    poll_interval: Duration,
    control: Arc<Mutex<Control>>,
}

impl DownloadManager {
    /// A manager with the stock sinks: songs into `song_files`, artwork
    /// into the artwork row.
    pub fn new(
        requests: DownloadRequestManager,
        fetcher: Arc<dyn DownloadFetcher>,
        settings: &DownloadSettings,
    ) -> Self {
        let mut sinks: HashMap<DownloadKind, Arc<dyn DownloadSink>> = HashMap::new();
        sinks.insert(DownloadKind::Song, Arc::new(SongFileSink));
        sinks.insert(DownloadKind::Artwork, Arc::new(ArtworkSink::new()));

        Self {
            requests,
            fetcher,
            sinks: Arc::new(sinks),
            max_concurrent: settings.max_concurrent.max(1) as usize,
            retry: RetryPolicy::new(
                settings.max_attempts,
                Duration::from_millis(settings.initial_backoff_ms),
            ),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            control: Arc::new(Mutex::new(Control {
                state: DownloadManagerState::Idle,
                token: None,
                handle: None,
                generation: 0,
            })),
        }
    }

    /// Replace the sink for one kind. Call before `start`.
    pub fn with_sink(mut self, kind: DownloadKind, sink: Arc<dyn DownloadSink>) -> Self {
        let mut sinks = (*self.sinks).clone();
        sinks.insert(kind, sink);
        self.sinks = Arc::new(sinks);
        self
    }

    pub fn requests(&self) -> &DownloadRequestManager {
        &self.requests
    }

    pub async fn state(&self) -> DownloadManagerState {
        self.control.lock().await.state
    }

    /// Requeue interrupted rows and launch the supervisor. Returns `false`
    /// when already running.
    ///
    /// # Errors
    ///
    /// Fails when the interrupted rows cannot be reset; nothing is launched.
    #[instrument(skip(self), fields(scope = %self.requests.scope()))]
    pub async fn start(&self) -> Result<bool> {
        let mut control = self.control.lock().await;
        if control.state != DownloadManagerState::Idle {
            debug!(state = ?control.state, "Download manager busy; start ignored");
            return Ok(false);
        }

        self.requests.reset_started_downloads().await?;

        control.generation += 1;
        let generation = control.generation;
        let token = CancellationToken::new();
        let manager = self.clone();
        let task_token = token.clone();

        let handle = core_async::spawn(async move {
            manager.supervise(task_token).await;
            manager.finish(generation).await;
        });

        control.state = DownloadManagerState::Running;
        control.token = Some(token);
        control.handle = Some(handle);
        info!(max_concurrent = self.max_concurrent, "Download manager started");
        Ok(true)
    }

    /// Request a stop. In-flight fetches run to completion.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        if control.state == DownloadManagerState::Running {
            if let Some(token) = &control.token {
                token.cancel();
            }
            control.state = DownloadManagerState::Stopping;
            info!(scope = %self.requests.scope(), "Download manager stopping");
        }
    }

    /// Stop and wait for every in-flight fetch. `Idle` afterwards.
    pub async fn stop_and_wait(&self) {
        let (handle, generation) = {
            let mut control = self.control.lock().await;
            if let Some(token) = &control.token {
                token.cancel();
            }
            if control.state == DownloadManagerState::Running {
                control.state = DownloadManagerState::Stopping;
            }
            (control.handle.take(), control.generation)
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Download supervisor panicked");
            }
        }
        self.finish(generation).await;
    }

    async fn finish(&self, generation: u64) {
        let mut control = self.control.lock().await;
        if control.generation == generation {
            control.state = DownloadManagerState::Idle;
            control.token = None;
            control.handle = None;
        }
    }

    async fn supervise(&self, token: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        while !token.is_cancelled() {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Download task panicked");
                }
            }

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            if token.is_cancelled() {
                break;
            }

            match self.requests.get_next_request_to_download().await {
                Ok(Some(record)) => {
                    let manager = self.clone();
                    let task_token = token.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        manager.process(record, &task_token).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.wait_for_work(&token).await;
                }
                Err(e) => {
                    drop(permit);
                    warn!(error = %e, "Could not claim the next download");
                    self.wait_for_work(&token).await;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Download task panicked");
            }
        }
        debug!(scope = %self.requests.scope(), "Download supervisor exited");
    }

    async fn wait_for_work(&self, token: &CancellationToken) {
        let wakeup = self.requests.wakeup().clone();
        let notified = wakeup.notified();
        let cancelled = token.cancelled();
        futures::pin_mut!(notified, cancelled);
        let _ = timeout(self.poll_interval, select(notified, cancelled)).await;
    }

    async fn process(&self, record: DownloadRecord, token: &CancellationToken) {
        let id = record.id.clone();
        let kind = record.kind;
        match self.download(record, token).await {
            Ok(()) => {}
            Err(e) if e.is_interrupted() => {
                debug!(id = %id, "Download left for the next run");
            }
            Err(e) => {
                error!(id = %id, %kind, error = %e, "Download failed");
                self.fail(&id, kind, DownloadErrorKind::Storage, 0, &e).await;
            }
        }
    }

    #[instrument(skip_all, fields(id = %record.id, kind = %record.kind))]
    async fn download(&self, record: DownloadRecord, token: &CancellationToken) -> Result<()> {
        self.requests.mark_started(&record.id).await?;
        self.requests.emit(DownloadEvent::Started {
            download_id: record.id.clone(),
            kind: record.kind.to_string(),
        });

        let Some(url) = record.url.clone() else {
            let err = DownloadError::NoUrl(record.id.clone());
            self.fail(&record.id, record.kind, DownloadErrorKind::NoUrl, 0, &err)
                .await;
            return Ok(());
        };

        let (outcome, attempts) = self.fetch_with_retry(&record.id, &url, token).await;
        let file = match outcome {
            Ok(file) => file,
            Err(e) if e.is_interrupted() => return Err(e),
            Err(e) => {
                warn!(attempts, error = %e, "Giving up on download");
                self.fail(&record.id, record.kind, DownloadErrorKind::Fetch, attempts, &e)
                    .await;
                return Ok(());
            }
        };

        let sink = self
            .sinks
            .get(&record.kind)
            .cloned()
            .ok_or_else(|| DownloadError::NoSink(record.kind.to_string()))?;

        let now = self.requests.now();
        let mut session = self.requests.store().begin().await?;
        let canceled = session
            .downloads()
            .find(&record.id)
            .await?
            .map_or(true, |current| current.is_canceled);

        if canceled {
            session.downloads().mark_canceled_observed(&record.id).await?;
            session.save().await?;
            info!("Download canceled; fetched bytes dropped");
            self.requests.emit(DownloadEvent::Canceled {
                download_id: record.id.clone(),
                kind: record.kind.to_string(),
            });
            return Ok(());
        }

        if let Err(e) = sink.persist(&mut session, &record, &file, now).await {
            session.discard().await?;
            self.fail(&record.id, record.kind, DownloadErrorKind::Storage, attempts, &e)
                .await;
            return Ok(());
        }
        session
            .downloads()
            .mark_finished(&record.id, now, i64::from(attempts))
            .await?;
        session.save().await?;

        info!(bytes = file.data.len(), attempts, "Download finished");
        self.requests.emit(DownloadEvent::Finished {
            download_id: record.id,
            kind: record.kind.to_string(),
            bytes: file.data.len() as u64,
        });
        Ok(())
    }

    /// Returns the outcome and the number of attempts made.
    async fn fetch_with_retry(
        &self,
        id: &str,
        url: &str,
        token: &CancellationToken,
    ) -> (Result<FetchedFile>, u32) {
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(file) => return (Ok(file), attempt),
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(id, attempt, ?delay, error = %e, "Retrying download");
                    let cancelled = token.cancelled();
                    let pause = sleep(delay);
                    futures::pin_mut!(cancelled, pause);
                    select(cancelled, pause).await;
                    if token.is_cancelled() {
                        return (Err(DownloadError::Interrupted(id.to_string())), attempt);
                    }
                    attempt += 1;
                }
                Err(e) => return (Err(e.into()), attempt),
            }
        }
    }

    async fn fail(
        &self,
        id: &str,
        kind: DownloadKind,
        error_kind: DownloadErrorKind,
        attempts: u32,
        err: &DownloadError,
    ) {
        if let Err(e) = self.requests.mark_errored(id, error_kind, attempts).await {
            error!(id, error = %e, "Could not record download failure");
        }
        self.requests.emit(DownloadEvent::Failed {
            download_id: id.to_string(),
            kind: kind.to_string(),
            message: err.to_string(),
            attempts,
        });
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("scope", &self.requests.scope())
            .field("max_concurrent", &self.max_concurrent)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
