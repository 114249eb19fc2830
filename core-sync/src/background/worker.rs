use super::BackgroundJob;
use core_async::sync::{CancellationToken, Mutex};
use core_async::task::JoinHandle;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    /// Cancel requested; the task has not finished yet
    Stopping,
}

struct Inner {
    state: WorkerState,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    /// Bumped on every launch so a finished task only resets its own run
    generation: u64,
}

/// Runs a set of [`BackgroundJob`]s concurrently on one spawned task.
#[derive(Clone)]
pub struct BackgroundWorker {
    name: &'static str,
    inner: Arc<Mutex<Inner>>,
}

impl BackgroundWorker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                state: WorkerState::Idle,
                token: None,
                handle: None,
                generation: 0,
            })),
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    /// Launch `jobs` unless the worker is busy or any job reports activity.
    /// Returns whether a task was launched.
    pub async fn start(&self, jobs: Vec<Arc<dyn BackgroundJob>>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkerState::Idle {
            debug!(worker = self.name, state = ?inner.state, "Worker busy; start ignored");
            return false;
        }
        if let Some(job) = jobs.iter().find(|job| job.is_active()) {
            debug!(worker = self.name, job = job.name(), "Job already active; start ignored");
            return false;
        }

        inner.generation += 1;
        let generation = inner.generation;
        let token = CancellationToken::new();
        let worker = self.clone();
        let task_token = token.clone();

        let handle = core_async::spawn(async move {
            worker.run_jobs(jobs, task_token).await;
            worker.finish(generation).await;
        });

        inner.state = WorkerState::Running;
        inner.token = Some(token);
        inner.handle = Some(handle);
        info!(worker = self.name, generation, "Background worker started");
        true
    }

    async fn run_jobs(&self, jobs: Vec<Arc<dyn BackgroundJob>>, token: CancellationToken) {
        let runs = jobs.into_iter().map(|job| {
            let token = token.clone();
            async move {
                match job.run(token).await {
                    Ok(()) => debug!(job = job.name(), "Background job finished"),
                    Err(e) if e.is_interrupted() => {
                        debug!(job = job.name(), "Background job stopped")
                    }
                    Err(e) => error!(job = job.name(), error = %e, "Background job failed"),
                }
            }
        });
        join_all(runs).await;
    }

    async fn finish(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation == generation {
            inner.state = WorkerState::Idle;
            inner.token = None;
            inner.handle = None;
        }
    }

    /// Request cancellation without waiting for the task.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == WorkerState::Running {
            if let Some(token) = &inner.token {
                token.cancel();
            }
            inner.state = WorkerState::Stopping;
            info!(worker = self.name, "Background worker stopping");
        }
    }

    /// Cancel and wait for the task to finish. The worker is `Idle` afterwards.
    pub async fn stop_and_wait(&self) {
        let (handle, generation) = {
            let mut inner = self.inner.lock().await;
            if let Some(token) = &inner.token {
                token.cancel();
            }
            if inner.state == WorkerState::Running {
                inner.state = WorkerState::Stopping;
            }
            (inner.handle.take(), inner.generation)
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(worker = self.name, error = %e, "Background task panicked");
            }
        }

        self.finish(generation).await;
    }
}

impl std::fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SyncError};
    use async_trait::async_trait;
    use core_async::time::{sleep, Duration};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Runs until cancelled or released.
    struct ParkedJob {
        runs: AtomicUsize,
        released: AtomicBool,
        busy_elsewhere: AtomicBool,
    }

    impl ParkedJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                released: AtomicBool::new(false),
                busy_elsewhere: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl BackgroundJob for ParkedJob {
        fn name(&self) -> &'static str {
            "parked"
        }

        fn is_active(&self) -> bool {
            self.busy_elsewhere.load(Ordering::SeqCst)
        }

        async fn run(&self, token: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            loop {
                if token.is_cancelled() {
                    return Err(SyncError::Interrupted { items_processed: 0 });
                }
                if self.released.load(Ordering::SeqCst) {
                    return Ok(());
                }
                sleep(Duration::from_millis(2)).await;
            }
        }
    }

    struct FailingJob;

    #[async_trait]
    impl BackgroundJob for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_active(&self) -> bool {
            false
        }

        async fn run(&self, _token: CancellationToken) -> Result<()> {
            Err(SyncError::Task("boom".to_string()))
        }
    }

    fn jobs(job: &Arc<ParkedJob>) -> Vec<Arc<dyn BackgroundJob>> {
        vec![job.clone() as Arc<dyn BackgroundJob>]
    }

    async fn wait_for(worker: &BackgroundWorker, state: WorkerState) {
        for _ in 0..100 {
            if worker.state().await == state {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("worker never reached {state:?}");
    }

    #[core_async::test]
    async fn test_start_stop_and_wait_cycle() {
        let worker = BackgroundWorker::new("test");
        let job = ParkedJob::new();
        assert_eq!(worker.state().await, WorkerState::Idle);

        assert!(worker.start(jobs(&job)).await);
        assert_eq!(worker.state().await, WorkerState::Running);

        // Second start while running is refused.
        assert!(!worker.start(jobs(&job)).await);

        worker.stop_and_wait().await;
        assert_eq!(worker.state().await, WorkerState::Idle);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        assert!(worker.start(jobs(&job)).await);
        worker.stop_and_wait().await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[core_async::test]
    async fn test_stop_moves_through_stopping_to_idle() {
        let worker = BackgroundWorker::new("test");
        let job = ParkedJob::new();
        assert!(worker.start(jobs(&job)).await);
        // Let the job reach its await point.
        sleep(Duration::from_millis(10)).await;

        worker.stop().await;
        let state = worker.state().await;
        assert!(matches!(state, WorkerState::Stopping | WorkerState::Idle));

        wait_for(&worker, WorkerState::Idle).await;
        assert!(worker.start(jobs(&job)).await);
        worker.stop_and_wait().await;
    }

    #[core_async::test]
    async fn test_task_finishing_returns_to_idle() {
        let worker = BackgroundWorker::new("test");
        let job = ParkedJob::new();
        assert!(worker.start(jobs(&job)).await);
        sleep(Duration::from_millis(10)).await;

        job.released.store(true, Ordering::SeqCst);
        wait_for(&worker, WorkerState::Idle).await;
    }

    #[core_async::test]
    async fn test_failed_job_does_not_poison_state() {
        let worker = BackgroundWorker::new("test");
        assert!(worker.start(vec![Arc::new(FailingJob) as Arc<dyn BackgroundJob>]).await);
        wait_for(&worker, WorkerState::Idle).await;
        assert!(worker.start(vec![Arc::new(FailingJob) as Arc<dyn BackgroundJob>]).await);
        worker.stop_and_wait().await;
    }

    #[core_async::test]
    async fn test_active_job_blocks_start() {
        let worker = BackgroundWorker::new("test");
        let job = ParkedJob::new();
        job.busy_elsewhere.store(true, Ordering::SeqCst);

        assert!(!worker.start(jobs(&job)).await);
        assert_eq!(worker.state().await, WorkerState::Idle);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
