//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the library sync and download crates:
//! - Logging and tracing bootstrap
//! - Configuration (`CoreConfig`, sync and download tunables)
//! - Event bus for sync, library and download notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
