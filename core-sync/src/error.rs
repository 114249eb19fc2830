use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// The remote catalog request failed
    #[error("Remote error: {0}")]
    Remote(#[from] BridgeError),

    /// A stop request was honored; committed progress is kept.
    #[error("Sync interrupted after {items_processed} items")]
    Interrupted { items_processed: u64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Default artwork could not be fetched: {0}")]
    DefaultArtworkUnavailable(String),

    #[error("Unknown library sync version: {0}")]
    UnknownVersion(i64),

    #[error("Library sync version cannot go from {from} down to {to}")]
    VersionDowngrade { from: String, to: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SyncError::Interrupted { .. })
    }

    /// Whether a later run can be expected to succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Interrupted { .. } | SyncError::DefaultArtworkUnavailable(_) => true,
            _ => false,
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        SyncError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
