//! # Background Sync
//!
//! Long-running sync work scheduled off the caller's task.
//!
//! - [`BackgroundWorker`] owns the single state guard (`Idle → Running →
//!   Stopping → Idle`) and the spawned task; it is the only mutual exclusion
//!   between the library, version and artwork syncers.
//! - [`BackgroundSyncer`] runs the artwork sweep and the incremental library
//!   sync side by side.
//! - [`BackgroundSyncerManager`] adds version handling: blocking migrations
//!   first, then either a version resync or the incremental sync, with the
//!   artwork sweep alongside.

mod jobs;
mod manager;
mod syncer;
mod worker;

pub use jobs::{LibrarySyncJob, VersionResyncer};
pub use manager::BackgroundSyncerManager;
pub use syncer::BackgroundSyncer;
pub use worker::{BackgroundWorker, WorkerState};

use crate::error::Result;
use async_trait::async_trait;
use core_async::sync::CancellationToken;

/// A unit of work the [`BackgroundWorker`] can run.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the underlying syncer is busy, possibly outside the worker.
    fn is_active(&self) -> bool;

    async fn run(&self, token: CancellationToken) -> Result<()>;
}
