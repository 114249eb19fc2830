//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the cooperative
//! `CancellationToken` used by every long-running loop in the sync and
//! download crates.
//!
//! ```rust
//! use std::sync::Arc;
//! use core_async::sync::Mutex;
//!
//! async fn example() {
//!     let writer = Arc::new(Mutex::new(()));
//!     let guard = writer.clone().lock_owned().await;
//!     // `guard` can move into another task; the lock is held until dropped.
//!     drop(guard);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard,
    OwnedSemaphorePermit, RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
