//! Upserting remote records into a write session.
//!
//! References are resolved by remote id against what the session can see:
//! an unresolvable artist becomes the Unknown Artist, an unresolvable album
//! or genre becomes `None`. Records the store rejects as invalid are skipped
//! with a warning so one malformed row does not stall a whole page.

use crate::error::Result;
use crate::remote::{
    ArtworkUrlParser, RemoteAlbum, RemoteArtist, RemoteGenre, RemotePodcast,
    RemotePodcastEpisode, RemoteSong,
};
use core_library::models::{
    NewAlbum, NewArtist, NewGenre, NewPodcast, NewPodcastEpisode, NewSong, Podcast, Song,
};
use core_library::{LibraryError, LibraryStorage};
use tracing::warn;

pub(crate) struct Reconciler<'p> {
    parser: &'p dyn ArtworkUrlParser,
    unknown_artist: Option<i64>,
}

impl<'p> Reconciler<'p> {
    pub(crate) fn new(parser: &'p dyn ArtworkUrlParser) -> Self {
        Self {
            parser,
            unknown_artist: None,
        }
    }

    async fn artwork_id(
        &self,
        session: &mut LibraryStorage,
        url: Option<&str>,
    ) -> Result<Option<i64>> {
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let key = self.parser.parse(url);
        let artwork = session.artworks().ensure(url, key.as_ref()).await?;
        Ok(Some(artwork.id))
    }

    async fn unknown_artist_id(&mut self, session: &mut LibraryStorage) -> Result<i64> {
        if let Some(id) = self.unknown_artist {
            return Ok(id);
        }
        let id = session.artists().ensure_unknown_artist().await?.id;
        self.unknown_artist = Some(id);
        Ok(id)
    }

    async fn artist_id(
        &mut self,
        session: &mut LibraryStorage,
        remote_id: Option<&str>,
    ) -> Result<i64> {
        if let Some(remote_id) = remote_id {
            if let Some(artist) = session.artists().find_by_remote_id(remote_id).await? {
                return Ok(artist.id);
            }
        }
        self.unknown_artist_id(session).await
    }

    async fn album_id(
        &self,
        session: &mut LibraryStorage,
        remote_id: Option<&str>,
    ) -> Result<Option<i64>> {
        match remote_id {
            Some(remote_id) => Ok(session
                .albums()
                .find_by_remote_id(remote_id)
                .await?
                .map(|a| a.id)),
            None => Ok(None),
        }
    }

    async fn genre_id(
        &self,
        session: &mut LibraryStorage,
        remote_id: Option<&str>,
    ) -> Result<Option<i64>> {
        match remote_id {
            Some(remote_id) => Ok(session
                .genres()
                .find_by_remote_id(remote_id)
                .await?
                .map(|g| g.id)),
            None => Ok(None),
        }
    }

    pub(crate) async fn artist(
        &mut self,
        session: &mut LibraryStorage,
        remote: &RemoteArtist,
    ) -> Result<()> {
        let artwork_id = self.artwork_id(session, remote.artwork_url.as_deref()).await?;
        let record = NewArtist {
            remote_id: remote.id.clone(),
            name: remote.name.clone(),
            album_count: remote.album_count,
            song_count: remote.song_count,
            artwork_id,
        };
        skip_invalid(session.artists().upsert(&record).await, "artist", &remote.id)?;
        Ok(())
    }

    pub(crate) async fn album(
        &mut self,
        session: &mut LibraryStorage,
        remote: &RemoteAlbum,
    ) -> Result<()> {
        let artist_id = self.artist_id(session, remote.artist_id.as_deref()).await?;
        let genre_id = self.genre_id(session, remote.genre_id.as_deref()).await?;
        let artwork_id = self.artwork_id(session, remote.artwork_url.as_deref()).await?;
        let record = NewAlbum {
            remote_id: remote.id.clone(),
            name: remote.name.clone(),
            artist_id,
            genre_id,
            year: remote.year,
            disc_count: remote.disc_count,
            song_count: remote.song_count,
            artwork_id,
        };
        skip_invalid(session.albums().upsert(&record).await, "album", &remote.id)?;
        Ok(())
    }

    /// Returns the stored song, `None` when the record was skipped.
    pub(crate) async fn song(
        &mut self,
        session: &mut LibraryStorage,
        remote: &RemoteSong,
    ) -> Result<Option<Song>> {
        let artist_id = self.artist_id(session, remote.artist_id.as_deref()).await?;
        let album_id = self.album_id(session, remote.album_id.as_deref()).await?;
        let genre_id = self.genre_id(session, remote.genre_id.as_deref()).await?;
        let artwork_id = self.artwork_id(session, remote.artwork_url.as_deref()).await?;
        let record = NewSong {
            remote_id: remote.id.clone(),
            title: remote.title.clone(),
            artist_id,
            album_id,
            genre_id,
            track_number: remote.track_number,
            disc_number: remote.disc_number,
            duration_secs: remote.duration_secs,
            bitrate: remote.bitrate,
            content_type: remote.content_type.clone(),
            url: remote.url.clone(),
            artwork_id,
        };
        skip_invalid(session.songs().upsert(&record).await, "song", &remote.id)
    }

    pub(crate) async fn genre(
        &mut self,
        session: &mut LibraryStorage,
        remote: &RemoteGenre,
    ) -> Result<()> {
        let record = NewGenre {
            remote_id: remote.id.clone(),
            name: remote.name.clone(),
            album_count: remote.album_count,
            song_count: remote.song_count,
        };
        skip_invalid(session.genres().upsert(&record).await, "genre", &remote.id)?;
        Ok(())
    }

    pub(crate) async fn podcast(
        &mut self,
        session: &mut LibraryStorage,
        remote: &RemotePodcast,
    ) -> Result<Option<Podcast>> {
        let artwork_id = self.artwork_id(session, remote.artwork_url.as_deref()).await?;
        let record = NewPodcast {
            remote_id: remote.id.clone(),
            title: remote.title.clone(),
            description: remote.description.clone(),
            episode_count: remote.episode_count,
            artwork_id,
        };
        skip_invalid(session.podcasts().upsert(&record).await, "podcast", &remote.id)
    }

    pub(crate) async fn episode(
        &mut self,
        session: &mut LibraryStorage,
        podcast_id: i64,
        remote: &RemotePodcastEpisode,
    ) -> Result<()> {
        let record = NewPodcastEpisode {
            remote_id: remote.id.clone(),
            podcast_id,
            title: remote.title.clone(),
            url: remote.url.clone(),
            duration_secs: remote.duration_secs,
            published_at: remote.published_at,
        };
        skip_invalid(
            session.podcasts().upsert_episode(&record).await,
            "podcast episode",
            &remote.id,
        )?;
        Ok(())
    }
}

fn skip_invalid<T>(
    result: core_library::Result<T>,
    entity: &str,
    remote_id: &str,
) -> Result<Option<T>> {
    match result {
        Ok(stored) => Ok(Some(stored)),
        Err(LibraryError::InvalidInput { message, .. }) => {
            warn!(entity, remote_id, %message, "Skipping invalid remote record");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::QueryArtworkUrlParser;
    use core_library::LibraryStore;

    #[core_async::test]
    async fn test_unresolved_artist_falls_back_to_unknown() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let parser = QueryArtworkUrlParser::default();
        let mut reconciler = Reconciler::new(&parser);
        let mut session = store.begin().await.unwrap();

        let song = RemoteSong {
            id: "s1".to_string(),
            title: "Cybele's Reverie".to_string(),
            artist_id: Some("missing".to_string()),
            album_id: Some("missing".to_string()),
            ..RemoteSong::default()
        };
        let stored = reconciler.song(&mut session, &song).await.unwrap().unwrap();
        let unknown = session.artists().ensure_unknown_artist().await.unwrap();

        assert_eq!(stored.artist_id, unknown.id);
        assert_eq!(stored.album_id, None);
    }

    #[core_async::test]
    async fn test_artwork_reused_by_parsed_key() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let parser = QueryArtworkUrlParser::default();
        let mut reconciler = Reconciler::new(&parser);
        let mut session = store.begin().await.unwrap();

        for (id, auth) in [("1", "a"), ("2", "b")] {
            let artist = RemoteArtist {
                id: id.to_string(),
                name: format!("Artist {id}"),
                artwork_url: Some(format!(
                    "https://h/image.php?object_type=artist&object_id=9&auth={auth}"
                )),
                ..RemoteArtist::default()
            };
            reconciler.artist(&mut session, &artist).await.unwrap();
        }

        assert_eq!(session.artworks().count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_invalid_record_is_skipped() {
        let store = LibraryStore::open_in_memory().await.unwrap();
        let parser = QueryArtworkUrlParser::default();
        let mut reconciler = Reconciler::new(&parser);
        let mut session = store.begin().await.unwrap();

        let nameless = RemoteArtist {
            id: "3".to_string(),
            ..RemoteArtist::default()
        };
        reconciler.artist(&mut session, &nameless).await.unwrap();
        assert_eq!(session.artists().count().await.unwrap(), 0);
    }
}
