//! # Download Queue
//!
//! - [`DownloadRequestManager`]: the persisted, scoped FIFO queue of byte
//!   fetches with idempotent enqueue and single-claim dequeue
//! - [`Downloadable`]: what can be queued (songs and artwork)
//! - [`DownloadManager`]: the worker that drains a queue scope, retrying
//!   failed fetches and persisting bytes through a [`DownloadSink`]
//!
//! ```ignore
//! let requests = DownloadRequestManager::new(store, DownloadScope::Kind(DownloadKind::Song), events);
//! requests.add(&song).await?;
//!
//! let manager = DownloadManager::new(requests, Arc::new(HttpFetcher::new(http)), &settings);
//! manager.start().await?;
//! ```

pub mod downloadable;
pub mod error;
pub mod fetcher;
pub mod manager;
pub mod request_manager;

pub use downloadable::{DownloadScope, Downloadable};
pub use error::{DownloadError, Result};
pub use fetcher::{
    ArtworkSink, DownloadFetcher, DownloadSink, FetchedFile, HttpFetcher, SongFileSink,
};
pub use manager::{DownloadManager, DownloadManagerState};
pub use request_manager::DownloadRequestManager;
