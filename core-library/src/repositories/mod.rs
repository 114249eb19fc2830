//! # Repositories
//!
//! Write-side data access. Every repository borrows the connection of an
//! open [`LibraryStorage`](crate::storage::LibraryStorage) session, so all
//! writes of one session share its transaction and its writer lock.
//!
//! ```rust,ignore
//! let mut session = store.begin().await?;
//! let artist = session.artists().upsert(&new_artist).await?;
//! session.albums().upsert(&NewAlbum { artist_id: artist.id, ..album }).await?;
//! session.save().await?;
//! ```
//!
//! Each repository records the tables it modifies in the session's
//! [`ChangeSet`]; the set is published as a `LibraryEvent::Changed` once the
//! session commits.
//!
//! Read-only queries that don't need a session live on
//! [`LibraryReader`](crate::reader::LibraryReader).

use std::collections::BTreeSet;

pub mod album;
pub mod artist;
pub mod artwork;
pub mod download;
pub mod genre;
pub mod pagination;
pub mod playlist;
pub mod podcast;
pub mod song;
pub mod song_file;
pub mod sync_wave;

pub use album::AlbumRepository;
pub use artist::ArtistRepository;
pub use artwork::ArtworkRepository;
pub use download::DownloadRepository;
pub use genre::GenreRepository;
pub use pagination::{Page, PageRequest};
pub use playlist::PlaylistRepository;
pub use podcast::PodcastRepository;
pub use song::SongRepository;
pub use song_file::SongFileRepository;
pub use sync_wave::SyncWaveRepository;

/// Tables touched by a write session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    tables: BTreeSet<&'static str>,
    cache_cleared: bool,
}

impl ChangeSet {
    pub fn touch(&mut self, table: &'static str) {
        self.tables.insert(table);
    }

    pub(crate) fn mark_cache_cleared(&mut self) {
        self.cache_cleared = true;
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && !self.cache_cleared
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn cache_cleared(&self) -> bool {
        self.cache_cleared
    }

    /// Touched table names in sorted order.
    pub fn entities(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_dedups_and_sorts() {
        let mut changes = ChangeSet::default();
        assert!(changes.is_empty());

        changes.touch("songs");
        changes.touch("artists");
        changes.touch("songs");

        assert_eq!(changes.entities(), vec!["artists", "songs"]);
        assert!(changes.contains("songs"));
        assert!(!changes.contains("albums"));
    }

    #[test]
    fn test_cache_clear_alone_is_a_change() {
        let mut changes = ChangeSet::default();
        changes.mark_cache_cleared();
        assert!(!changes.is_empty());
        assert!(changes.entities().is_empty());
    }
}
