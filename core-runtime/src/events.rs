//! # Event Bus System
//!
//! Typed notifications from the sync and download subsystems, delivered over
//! a `tokio::sync::broadcast` channel. Presentation code subscribes to refresh
//! its live views; the core never waits on subscribers.
//!
//! ```text
//! ┌──────────────┐  emit   ┌───────────┐  subscribe  ┌────────────────┐
//! │ LibrarySyncer├────────>│           ├────────────>│ library views  │
//! ├──────────────┤         │ EventBus  │             ├────────────────┤
//! │ LibraryStore ├────────>│           ├────────────>│ download badge │
//! ├──────────────┤         │           │             └────────────────┘
//! │ Downloader   ├────────>│           │
//! └──────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Download(DownloadEvent::Queued {
//!     download_id: "song-42".to_string(),
//!     kind: "song".to_string(),
//! })).ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns `Err`; producers call `.ok()` on it.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Library sync, artwork sync and migration runs
    Sync(SyncEvent),
    /// Committed changes to the persisted library
    Library(LibraryEvent),
    /// Download queue transitions
    Download(DownloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by sync runs.
///
/// `run_id` identifies one invocation (a full sync, one incremental pass, one
/// artwork sweep); `kind` names which of those it is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        run_id: String,
        kind: String,
        wave_id: Option<i64>,
    },
    /// Emitted after each committed page or batch
    Progress {
        run_id: String,
        phase: String,
        items_processed: u64,
        offset: u64,
    },
    Completed {
        run_id: String,
        kind: String,
        wave_id: Option<i64>,
        items_processed: u64,
        duration_secs: u64,
    },
    Failed {
        run_id: String,
        message: String,
        items_processed: u64,
        recoverable: bool,
    },
    /// The run honored a stop request; progress so far is committed
    Cancelled {
        run_id: String,
        items_processed: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A write session committed. `entities` lists the touched tables
    /// (`artists`, `songs`, `downloads`, ...).
    Changed { entities: Vec<String> },
    /// Cached song files and artwork bytes were purged
    CacheCleared,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Changed { .. } => "Library changed",
            LibraryEvent::CacheCleared => "Library cache cleared",
        }
    }

    /// Whether a subscriber watching `entity` should refresh.
    pub fn touches(&self, entity: &str) -> bool {
        match self {
            LibraryEvent::Changed { entities } => entities.iter().any(|e| e == entity),
            LibraryEvent::CacheCleared => true,
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Queued {
        download_id: String,
        kind: String,
    },
    Started {
        download_id: String,
        kind: String,
    },
    Finished {
        download_id: String,
        kind: String,
        bytes: u64,
    },
    Failed {
        download_id: String,
        kind: String,
        message: String,
        attempts: u32,
    },
    /// An in-flight download observed its cancel flag and discarded its bytes
    Canceled {
        download_id: String,
        kind: String,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Finished { .. } => "Download finished",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Canceled { .. } => "Download canceled",
        }
    }

    pub fn download_id(&self) -> &str {
        match self {
            DownloadEvent::Queued { download_id, .. }
            | DownloadEvent::Started { download_id, .. }
            | DownloadEvent::Finished { download_id, .. }
            | DownloadEvent::Failed { download_id, .. }
            | DownloadEvent::Canceled { download_id, .. } => download_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event broadcaster. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A receiver that skips events not matching its filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let downloads_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
