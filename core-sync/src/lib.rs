//! # Library Sync
//!
//! Keeps the local library store in step with a remote music server.
//!
//! ## Components
//!
//! - **Remote catalog** (`remote`): the server contract and typed records
//! - **Library syncer** (`library_syncer`): full, incremental and resumable
//!   wave-based catalog sync, playlists and podcasts
//! - **Artwork syncer** (`artwork_syncer`): classifies artwork as placeholder
//!   or custom image
//! - **Library updater** (`library_updater`): blocking migrations run on
//!   sync-version bumps
//! - **Sync version** (`version`): the persisted `LibrarySyncVersion`
//! - **Background** (`background`): worker state machine and schedulers

pub mod artwork_syncer;
pub mod background;
pub mod error;
pub mod library_syncer;
pub mod library_updater;
mod control;
mod reconcile;
pub mod remote;
pub mod version;

pub use artwork_syncer::{ArtworkSyncReport, ArtworkSyncer};
pub use background::{
    BackgroundJob, BackgroundSyncer, BackgroundSyncerManager, BackgroundWorker, LibrarySyncJob,
    VersionResyncer, WorkerState,
};
pub use error::{Result, SyncError};
pub use library_syncer::{IncrementalOutcome, LibrarySyncer, SyncSummary};
pub use library_updater::{LibraryUpdater, UpdateReport};
pub use remote::{
    ArtworkUrlParser, LibraryMetadata, PageQuery, QueryArtworkUrlParser, RemoteAlbum,
    RemoteArtist, RemoteCatalog, RemoteGenre, RemotePlaylist, RemotePodcast,
    RemotePodcastEpisode, RemoteSong,
};
pub use version::{LibrarySyncVersion, SyncVersionStore};
