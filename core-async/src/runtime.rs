//! Runtime entry points.
//!
//! These wrap tokio's runtime builder so tests and binaries never name tokio.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be built, which only happens when the
/// process is out of OS resources.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| panic!("core_async::runtime::block_on: {err}"))
        .block_on(future)
}

/// Runs the provided future on a multi-threaded runtime with `worker_threads`
/// workers. Used by contention tests.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
pub fn block_on_multi_thread<F>(worker_threads: usize, future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
        .unwrap_or_else(|err| panic!("core_async::runtime::block_on_multi_thread: {err}"))
        .block_on(future)
}
