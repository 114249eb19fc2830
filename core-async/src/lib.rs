//! Async runtime layer for the library sync core.
//!
//! Every `core-*` crate spawns tasks, sleeps and locks through this crate
//! instead of naming tokio directly, so the executor can be swapped in one
//! place.
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleep, timeout, durations
//! - `sync`: mutexes, channels, `Notify` and `CancellationToken`
//! - `runtime`: blocking entry points used by the test/main macros
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn poll_until_cancelled(token: CancellationToken) -> u32 {
//!     let mut ticks = 0;
//!     while !token.is_cancelled() {
//!         sleep(Duration::from_millis(5)).await;
//!         ticks += 1;
//!     }
//!     ticks
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
