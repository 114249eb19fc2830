//! Byte sources and sinks for the download manager.

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{HttpClient, HttpRequest};
use bytes::Bytes;
use core_async::time::Duration;
use core_library::models::{ArtworkStatus, DownloadRecord};
use core_library::LibraryStorage;
use std::sync::Arc;

/// Bytes of one fetched download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Performs a single fetch attempt. The manager owns retries.
#[async_trait]
pub trait DownloadFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> BridgeResult<FetchedFile>;
}

/// [`DownloadFetcher`] over the host's [`HttpClient`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DownloadFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<FetchedFile> {
        let request = HttpRequest::get(url).timeout(self.timeout);
        let response = self.client.execute(request).await?.error_for_status(url)?;
        let content_type = response.content_type().map(str::to_string);
        Ok(FetchedFile {
            data: response.body,
            content_type,
        })
    }
}

/// Persists fetched bytes for one download kind, inside the session that
/// also marks the row finished.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn persist(
        &self,
        session: &mut LibraryStorage,
        record: &DownloadRecord,
        file: &FetchedFile,
        now: i64,
    ) -> Result<()>;
}

/// Songs land in `song_files`, keyed by the song row id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SongFileSink;

#[async_trait]
impl DownloadSink for SongFileSink {
    async fn persist(
        &self,
        session: &mut LibraryStorage,
        record: &DownloadRecord,
        file: &FetchedFile,
        now: i64,
    ) -> Result<()> {
        session
            .song_files()
            .store(record.element_id, &file.data, file.content_type.as_deref(), now)
            .await?;
        Ok(())
    }
}

/// Artwork bytes are classified against the server placeholder when one is
/// known; matching images are recorded as default and not stored.
#[derive(Debug, Clone, Default)]
pub struct ArtworkSink {
    default_image: Option<Bytes>,
}

impl ArtworkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_image(mut self, image: Bytes) -> Self {
        self.default_image = Some(image);
        self
    }

    pub fn classify(&self, data: &[u8]) -> ArtworkStatus {
        match &self.default_image {
            Some(placeholder) if placeholder.as_ref() == data => ArtworkStatus::IsDefaultImage,
            _ => ArtworkStatus::CustomImage,
        }
    }
}

#[async_trait]
impl DownloadSink for ArtworkSink {
    async fn persist(
        &self,
        session: &mut LibraryStorage,
        record: &DownloadRecord,
        file: &FetchedFile,
        now: i64,
    ) -> Result<()> {
        let status = self.classify(&file.data);
        session
            .artworks()
            .set_status(record.element_id, status, Some(file.data.as_ref()), now)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::HttpResponse;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        pub Client {}

        #[async_trait]
        impl HttpClient for Client {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &'static [u8]) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "audio/mpeg".to_string());
        HttpResponse {
            status,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[core_async::test]
    async fn test_http_fetcher_returns_body_and_content_type() {
        let mut client = MockClient::new();
        client
            .expect_execute()
            .withf(|request| request.url == "https://music.test/play/1")
            .times(1)
            .returning(|_| Ok(response(200, b"mp3 bytes")));

        let fetched = HttpFetcher::new(Arc::new(client))
            .fetch("https://music.test/play/1")
            .await
            .unwrap();

        assert_eq!(fetched.data, Bytes::from_static(b"mp3 bytes"));
        assert_eq!(fetched.content_type.as_deref(), Some("audio/mpeg"));
    }

    #[core_async::test]
    async fn test_http_fetcher_maps_error_status() {
        let mut client = MockClient::new();
        client
            .expect_execute()
            .returning(|_| Ok(response(404, b"")));

        let err = HttpFetcher::new(Arc::new(client))
            .fetch("https://music.test/play/404")
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_artwork_classification() {
        let sink = ArtworkSink::new().with_default_image(Bytes::from_static(b"placeholder"));

        assert_eq!(sink.classify(b"placeholder"), ArtworkStatus::IsDefaultImage);
        assert_eq!(sink.classify(b"cover"), ArtworkStatus::CustomImage);
        assert_eq!(ArtworkSink::new().classify(b"placeholder"), ArtworkStatus::CustomImage);
    }
}
