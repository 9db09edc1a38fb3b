//! Music search/stream provider adapter (§1 external collaborators).
//!
//! Reached over a shared `reqwest::Client` the same way this stack's HTTP
//! client collaborators are built — a single client constructed once in
//! `bootstrap.rs` and handed to every service that needs it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BeatsyncError, BeatsyncResult};

/// A single search result returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Trait for the external music search/stream provider.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    async fn search(&self, query: &str) -> BeatsyncResult<Vec<TrackResult>>;

    /// Resolves a track id (from a prior `search`) to a playable opaque URL.
    async fn stream_url(&self, track_id: &str) -> BeatsyncResult<String>;
}

/// Default HTTP-backed adapter, talking to `PROVIDER_URL`.
pub struct HttpMusicProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMusicProvider {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl MusicProvider for HttpMusicProvider {
    async fn search(&self, query: &str) -> BeatsyncResult<Vec<TrackResult>> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| BeatsyncError::Provider(e.to_string()))?;

        response
            .json::<Vec<TrackResult>>()
            .await
            .map_err(|e| BeatsyncError::Provider(e.to_string()))
    }

    async fn stream_url(&self, track_id: &str) -> BeatsyncResult<String> {
        let url = format!(
            "{}/stream/{}",
            self.base_url.trim_end_matches('/'),
            track_id
        );
        Ok(url)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MockMusicProvider {
        pub search_calls: AtomicUsize,
    }

    #[async_trait]
    impl MusicProvider for MockMusicProvider {
        async fn search(&self, query: &str) -> BeatsyncResult<Vec<TrackResult>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![TrackResult {
                track_id: "t1".into(),
                title: format!("result for {query}"),
                artist: "Mock Artist".into(),
                duration_seconds: Some(180.0),
            }])
        }

        async fn stream_url(&self, track_id: &str) -> BeatsyncResult<String> {
            Ok(format!("https://mock.invalid/stream/{track_id}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockMusicProvider;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn mock_provider_tracks_search_calls() {
        let provider = MockMusicProvider::default();
        let results = provider.search("synthwave").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 1);
    }
}
