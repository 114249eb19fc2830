//! Library sync version
//!
//! The version of the sync logic that last completed against this store. It
//! lives in the host's settings rather than in the library database and is
//! only ever raised.

use crate::error::{Result, SyncError};
use bridge_traits::SettingsStore;
use core_library::LibraryReader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const SYNC_VERSION_KEY: &str = "library.sync_version";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum LibrarySyncVersion {
    /// Baseline schema
    V6 = 6,
    /// Genres are synced
    V7 = 7,
    /// Podcasts are synced
    V8 = 8,
    /// Artwork identity parsed from the URL
    V9 = 9,
    /// Album year/disc and song disc numbers
    V10 = 10,
    /// Song bitrate and content type
    V11 = 11,
}

impl LibrarySyncVersion {
    pub const NEWEST: LibrarySyncVersion = LibrarySyncVersion::V11;

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            6 => Ok(Self::V6),
            7 => Ok(Self::V7),
            8 => Ok(Self::V8),
            9 => Ok(Self::V9),
            10 => Ok(Self::V10),
            11 => Ok(Self::V11),
            other => Err(SyncError::UnknownVersion(other)),
        }
    }

    pub fn is_newest(self) -> bool {
        self == Self::NEWEST
    }
}

impl fmt::Display for LibrarySyncVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_i64())
    }
}

/// Reads and raises the persisted [`LibrarySyncVersion`].
#[derive(Clone)]
pub struct SyncVersionStore {
    settings: Arc<dyn SettingsStore>,
}

impl SyncVersionStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// The persisted version, if any.
    pub async fn get(&self) -> Result<Option<LibrarySyncVersion>> {
        match self.settings.get_i64(SYNC_VERSION_KEY).await? {
            Some(value) => LibrarySyncVersion::from_i64(value).map(Some),
            None => Ok(None),
        }
    }

    /// Persist `version`. Writing the current version again is a no-op;
    /// writing an older one fails with [`SyncError::VersionDowngrade`].
    pub async fn set(&self, version: LibrarySyncVersion) -> Result<()> {
        if let Some(current) = self.get().await? {
            if version < current {
                return Err(SyncError::VersionDowngrade {
                    from: current.to_string(),
                    to: version.to_string(),
                });
            }
            if version == current {
                return Ok(());
            }
        }

        self.settings
            .set_i64(SYNC_VERSION_KEY, version.as_i64())
            .await?;
        info!(%version, "Library sync version raised");
        Ok(())
    }

    /// The effective version of the store behind `reader`.
    ///
    /// Without a persisted value an empty store counts as newest (a fresh
    /// full sync produces everything) and a populated one as `V6`. The
    /// inferred value is persisted so later reads agree.
    pub async fn load(&self, reader: &LibraryReader) -> Result<LibrarySyncVersion> {
        if let Some(version) = self.get().await? {
            return Ok(version);
        }

        let version = if reader.has_library_data().await? {
            LibrarySyncVersion::V6
        } else {
            LibrarySyncVersion::NEWEST
        };
        debug!(%version, "No persisted library sync version; inferred from store");
        self.settings
            .set_i64(SYNC_VERSION_KEY, version.as_i64())
            .await?;
        Ok(version)
    }
}

impl fmt::Debug for SyncVersionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncVersionStore").finish_non_exhaustive()
    }
}
