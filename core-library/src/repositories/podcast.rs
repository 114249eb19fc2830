//! Podcast and episode repository

use crate::error::{LibraryError, Result};
use crate::models::{NewPodcast, NewPodcastEpisode, Podcast, PodcastEpisode};
use crate::repositories::ChangeSet;
use sqlx::{query_as, SqliteConnection};

pub struct PodcastRepository<'s> {
    conn: &'s mut SqliteConnection,
    changes: &'s mut ChangeSet,
}

impl<'s> PodcastRepository<'s> {
    pub(crate) fn new(conn: &'s mut SqliteConnection, changes: &'s mut ChangeSet) -> Self {
        Self { conn, changes }
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Podcast>> {
        let podcast = query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(podcast)
    }

    pub async fn find_by_remote_id(&mut self, remote_id: &str) -> Result<Option<Podcast>> {
        let podcast = query_as::<_, Podcast>("SELECT * FROM podcasts WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(podcast)
    }

    pub async fn upsert(&mut self, podcast: &NewPodcast) -> Result<Podcast> {
        if podcast.remote_id.trim().is_empty() || podcast.title.trim().is_empty() {
            return Err(LibraryError::invalid(
                "Podcast",
                "remote id and title are required",
            ));
        }

        let stored = query_as::<_, Podcast>(
            r#"
            INSERT INTO podcasts (remote_id, title, description, episode_count, artwork_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                title = excluded.title,
                description = COALESCE(excluded.description, podcasts.description),
                episode_count = excluded.episode_count,
                artwork_id = COALESCE(excluded.artwork_id, podcasts.artwork_id)
            RETURNING *
            "#,
        )
        .bind(&podcast.remote_id)
        .bind(&podcast.title)
        .bind(&podcast.description)
        .bind(podcast.episode_count)
        .bind(podcast.artwork_id)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("podcasts");
        Ok(stored)
    }

    pub async fn upsert_episode(&mut self, episode: &NewPodcastEpisode) -> Result<PodcastEpisode> {
        if episode.remote_id.trim().is_empty() {
            return Err(LibraryError::invalid(
                "PodcastEpisode",
                "remote id cannot be empty",
            ));
        }

        let stored = query_as::<_, PodcastEpisode>(
            r#"
            INSERT INTO podcast_episodes (
                remote_id, podcast_id, title, url, duration_secs, published_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO UPDATE SET
                podcast_id = excluded.podcast_id,
                title = excluded.title,
                url = COALESCE(excluded.url, podcast_episodes.url),
                duration_secs = excluded.duration_secs,
                published_at = COALESCE(excluded.published_at, podcast_episodes.published_at)
            RETURNING *
            "#,
        )
        .bind(&episode.remote_id)
        .bind(episode.podcast_id)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(episode.duration_secs)
        .bind(episode.published_at)
        .fetch_one(&mut *self.conn)
        .await?;

        self.changes.touch("podcast_episodes");
        Ok(stored)
    }

    pub async fn episodes(&mut self, podcast_id: i64) -> Result<Vec<PodcastEpisode>> {
        let episodes = query_as::<_, PodcastEpisode>(
            "SELECT * FROM podcast_episodes WHERE podcast_id = ? ORDER BY published_at DESC, id",
        )
        .bind(podcast_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(episodes)
    }
}
