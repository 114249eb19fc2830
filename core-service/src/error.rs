use thiserror::Error;

/// Errors surfaced to host applications; every layer converts in with `?`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Library store error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    /// A façade call referenced a local row that doesn't exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
