//! # Library Store
//!
//! The persisted local copy of the remote catalog:
//! - SQLite schema and migrations (`db`)
//! - Models for artists, albums, songs, genres, playlists, podcasts,
//!   artwork, sync waves and the download queue (`models`)
//! - Write sessions holding the store's single writer lock (`storage`)
//! - Session-scoped repositories (`repositories`) and pool-backed read
//!   queries (`reader`)

pub mod db;
pub mod error;
pub mod models;
pub mod reader;
pub mod repositories;
pub mod storage;

pub use error::{LibraryError, Result};
pub use reader::LibraryReader;
pub use storage::{LibraryStorage, LibraryStore};
