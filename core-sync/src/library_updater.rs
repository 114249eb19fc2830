//! # Library Updater
//!
//! Blocking store migrations tied to [`LibrarySyncVersion`] bumps. They run
//! before any background sync is scheduled and each one commits atomically
//! together with nothing else; the version is raised only after the commit.
//!
//! ## v9: artwork identity
//!
//! Artwork used to be keyed by URL, and servers embed session tokens in
//! artwork URLs, so the same image accumulated one row per session. From v9
//! the identity is the `(type, id)` pair parsed from the URL. The migration
//! walks rows in id order:
//!
//! 1. unparseable rows are deleted (owners lose the reference)
//! 2. the first row seen for a key is kept and stamped with the key
//! 3. later rows with the same key hand their owners to the kept row, lose
//!    their queued downloads and are deleted

use crate::error::Result;
use crate::remote::ArtworkUrlParser;
use crate::version::{LibrarySyncVersion, SyncVersionStore};
use core_library::models::{ArtworkKey, DownloadKind};
use core_library::LibraryStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub parsed: u64,
    pub deleted_unparseable: u64,
    pub merged_duplicates: u64,
    pub repointed_owners: u64,
}

pub struct LibraryUpdater {
    store: LibraryStore,
    parser: Arc<dyn ArtworkUrlParser>,
    versions: SyncVersionStore,
}

impl LibraryUpdater {
    pub fn new(
        store: LibraryStore,
        parser: Arc<dyn ArtworkUrlParser>,
        versions: SyncVersionStore,
    ) -> Self {
        Self {
            store,
            parser,
            versions,
        }
    }

    /// Run every migration newer than the persisted version.
    ///
    /// Returns the artwork migration report when it ran.
    #[instrument(skip_all)]
    pub async fn perform_blocking_library_updates(&self) -> Result<Option<UpdateReport>> {
        let version = self.versions.load(&self.store.reader()).await?;
        if version >= LibrarySyncVersion::V9 {
            return Ok(None);
        }

        info!(from = %version, "Running artwork identity migration");
        let report = self.migrate_artwork_identity().await?;
        self.versions.set(LibrarySyncVersion::V9).await?;
        Ok(Some(report))
    }

    /// The v9 migration on its own, in one session.
    pub async fn migrate_artwork_identity(&self) -> Result<UpdateReport> {
        let mut session = self.store.begin().await?;
        let rows = session.artworks().all_ordered().await?;

        let mut winners: HashMap<ArtworkKey, i64> = HashMap::new();
        let mut stamps = Vec::new();
        let mut losers = Vec::new();
        let mut unparseable = Vec::new();

        for artwork in &rows {
            let Some(key) = self.parser.parse(&artwork.url) else {
                unparseable.push(artwork.id);
                continue;
            };

            match winners.get(&key) {
                Some(&winner) => losers.push((artwork.id, winner)),
                None => {
                    winners.insert(key.clone(), artwork.id);
                    if artwork.key().as_ref() != Some(&key) {
                        stamps.push((artwork.id, key));
                    }
                }
            }
        }

        let mut report = UpdateReport {
            parsed: (rows.len() - unparseable.len()) as u64,
            ..UpdateReport::default()
        };

        for id in unparseable {
            warn!(artwork_id = id, "Deleting artwork with unparseable URL");
            session.downloads().delete_for_element(DownloadKind::Artwork, id).await?;
            if session.artworks().delete(id).await? {
                report.deleted_unparseable += 1;
            }
        }

        // Losers go before stamping so a loser that already carries the key
        // does not collide with its winner on the unique index.
        for (loser, winner) in losers {
            report.repointed_owners += session.artworks().repoint_owners(loser, winner).await?;
            session
                .downloads()
                .delete_for_element(DownloadKind::Artwork, loser)
                .await?;
            if session.artworks().delete(loser).await? {
                report.merged_duplicates += 1;
            }
        }

        for (id, key) in &stamps {
            session.artworks().stamp_key(*id, key).await?;
        }

        session.save().await?;
        info!(
            parsed = report.parsed,
            deleted_unparseable = report.deleted_unparseable,
            merged_duplicates = report.merged_duplicates,
            repointed_owners = report.repointed_owners,
            "Artwork identity migration committed"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for LibraryUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryUpdater").finish_non_exhaustive()
    }
}
