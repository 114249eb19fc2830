//! What can be queued, and which part of the queue a manager owns.

use core_library::models::{Artwork, DownloadKind, Song};
use serde::{Deserialize, Serialize};

/// An entity whose bytes can be fetched into the store.
///
/// `unique_id` is the queue's primary key, so two values with the same id
/// share one queue row.
pub trait Downloadable: Send + Sync {
    fn unique_id(&self) -> String;

    fn download_kind(&self) -> DownloadKind;

    /// Local row id of the entity the bytes belong to
    fn element_id(&self) -> i64;

    fn download_url(&self) -> Option<String>;
}

impl Downloadable for Song {
    fn unique_id(&self) -> String {
        format!("song-{}", self.remote_id)
    }

    fn download_kind(&self) -> DownloadKind {
        DownloadKind::Song
    }

    fn element_id(&self) -> i64 {
        self.id
    }

    fn download_url(&self) -> Option<String> {
        self.url.clone()
    }
}

impl Downloadable for Artwork {
    fn unique_id(&self) -> String {
        format!("artwork-{}", self.id)
    }

    fn download_kind(&self) -> DownloadKind {
        DownloadKind::Artwork
    }

    fn element_id(&self) -> i64 {
        self.id
    }

    fn download_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

/// Rows a request manager sees. Every scoped query filters on it, so a song
/// manager and an artwork manager sharing one table never touch each
/// other's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownloadScope {
    #[default]
    All,
    Kind(DownloadKind),
}

impl DownloadScope {
    pub fn contains(&self, kind: DownloadKind) -> bool {
        match self {
            DownloadScope::All => true,
            DownloadScope::Kind(own) => *own == kind,
        }
    }

    /// Repository filter; `None` matches every kind.
    pub fn kind_filter(&self) -> Option<DownloadKind> {
        match self {
            DownloadScope::All => None,
            DownloadScope::Kind(kind) => Some(*kind),
        }
    }
}

impl std::fmt::Display for DownloadScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadScope::All => write!(f, "all"),
            DownloadScope::Kind(kind) => write!(f, "{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::ArtworkStatus;

    #[test]
    fn test_song_and_artwork_ids_do_not_collide() {
        let song = Song {
            id: 7,
            remote_id: "7".to_string(),
            url: Some("https://music.test/play/7".to_string()),
            ..Song::default()
        };
        let artwork = Artwork {
            id: 7,
            url: "https://music.test/image.php?object_id=7".to_string(),
            status: ArtworkStatus::NotChecked,
            artwork_type: None,
            artwork_remote_id: None,
            image_data: None,
            updated_at: 0,
        };

        assert_eq!(song.unique_id(), "song-7");
        assert_eq!(artwork.unique_id(), "artwork-7");
        assert_eq!(song.element_id(), artwork.element_id());
        assert_eq!(artwork.download_url().as_deref(), Some(artwork.url.as_str()));
    }

    #[test]
    fn test_scope_filter() {
        let songs = DownloadScope::Kind(DownloadKind::Song);

        assert!(songs.contains(DownloadKind::Song));
        assert!(!songs.contains(DownloadKind::Artwork));
        assert!(DownloadScope::All.contains(DownloadKind::Artwork));
        assert_eq!(DownloadScope::All.kind_filter(), None);
        assert_eq!(songs.kind_filter(), Some(DownloadKind::Song));
        assert_eq!(songs.to_string(), "song");
    }
}
