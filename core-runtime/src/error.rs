//! Errors raised while assembling the core, before any sync or download runs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or out-of-range setting
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A bridge the host has to inject was not provided
    #[error("Missing host capability {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A default adapter could not be built
    #[error("Bridge setup failed: {0}")]
    Bridge(String),
}

pub type Result<T> = std::result::Result<T, Error>;
