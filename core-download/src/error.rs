use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// Fetching the bytes failed after every retry
    #[error("Fetch failed: {0}")]
    Fetch(#[from] BridgeError),

    #[error("Download {0} has no URL")]
    NoUrl(String),

    #[error("No sink registered for {0} downloads")]
    NoSink(String),

    /// A stop request was honored; the row is requeued on the next start.
    #[error("Download {0} interrupted")]
    Interrupted(String),
}

impl DownloadError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DownloadError::Interrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
