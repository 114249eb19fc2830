//! In-flight tracking and stop support shared by the syncers.
//!
//! Every public operation enters a [`RunControl`] and gets an
//! [`ActiveGuard`] plus a [`RunToken`]. `stop()` cancels the tokens of the
//! runs already in flight and installs a fresh one, so later calls are not
//! affected. `stop_and_wait()` then parks until the last guard drops.

use core_async::sync::{CancellationToken, Mutex, Notify};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct RunControl {
    active: AtomicUsize,
    idle: Notify,
    stop: Mutex<CancellationToken>,
}

impl RunControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            idle: Notify::new(),
            stop: Mutex::new(CancellationToken::new()),
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Mark an operation in flight; it counts until the guard drops.
    pub(crate) fn enter(self: &Arc<Self>) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(Arc::clone(self))
    }

    /// Like [`enter`](Self::enter), plus a token that trips when either the
    /// caller cancels or the syncer is stopped.
    pub(crate) async fn begin_run(
        self: &Arc<Self>,
        caller: &CancellationToken,
    ) -> (ActiveGuard, RunToken) {
        // Token first: once the guard makes the run visible to
        // `stop_and_wait`, a stop is guaranteed to reach it.
        let stop = self.stop.lock().await.clone();
        let guard = self.enter();
        let token = RunToken {
            caller: caller.clone(),
            stop,
        };
        (guard, token)
    }

    pub(crate) async fn stop(&self) {
        let mut stop = self.stop.lock().await;
        stop.cancel();
        *stop = CancellationToken::new();
    }

    pub(crate) async fn stop_and_wait(&self) {
        self.stop().await;
        loop {
            // Registered before the check so a guard dropping in between
            // still wakes us.
            let idle = self.idle.notified();
            if !self.is_active() {
                return;
            }
            idle.await;
        }
    }
}

/// Counts one in-flight operation.
pub(crate) struct ActiveGuard(Arc<RunControl>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Cancellation view of one run.
#[derive(Debug, Clone)]
pub(crate) struct RunToken {
    caller: CancellationToken,
    stop: CancellationToken,
}

impl RunToken {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.caller.is_cancelled() || self.stop.is_cancelled()
    }
}
