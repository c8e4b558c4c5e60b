//! HTTP catalog client
//!
//! `reqwest`-backed implementation of `CatalogClient` against the
//! catalog's JSON API. Requests are spaced by a minimum interval to stay
//! under the catalog's (undocumented) rate limit. Credentials are an
//! injected bearer token; this module never reads credential files.

use crate::catalog::{AddTracksOutcome, CatalogClient, SearchFilter, SearchResult};
use crate::error::{CatalogError, Result};
use crate::types::{MoodCategory, PlaylistRef, SongCandidate};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = "mixwright/0.1.0 (catalog orchestrator)";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 250; // 4 requests per second

/// Spaces requests by a minimum interval
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the interval
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ── Wire DTOs ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TrackDto {
    id: String,
    title: String,
    artist: String,
    duration_seconds: Option<u32>,
}

impl From<TrackDto> for SongCandidate {
    fn from(dto: TrackDto) -> Self {
        SongCandidate::new(dto.id, dto.title, dto.artist, dto.duration_seconds)
    }
}

#[derive(Debug, Deserialize)]
struct TracksResponse {
    tracks: Vec<TrackDto>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum SearchHitDto {
    Song(TrackDto),
    Artist { id: String, name: String },
    Album { id: String, title: String, artist: String },
    Playlist { id: String, title: String },
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHitDto>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyResponse {
    categories: Vec<MoodCategory>,
}

#[derive(Debug, Deserialize)]
struct PlaylistsResponse {
    playlists: Vec<PlaylistRef>,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylistResponse {
    id: String,
}

// ── Client ─────────────────────────────────────────────────────────────

/// Catalog API client over HTTP/JSON
pub struct HttpCatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpCatalogClient {
    /// Create a client for the given API base URL and bearer token
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    fn map_transport_error(e: reqwest::Error) -> CatalogError {
        if e.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Upstream(e.to_string())
        }
    }

    /// Map a non-success status to a failure kind, draining the body
    /// for the upstream detail message.
    async fn error_for_status(response: reqwest::Response) -> CatalogError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => CatalogError::Unauthenticated(body),
            429 => CatalogError::RateLimited,
            code => CatalogError::Upstream(format!("HTTP {}: {}", code, body)),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Catalog GET");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Upstream(format!("Malformed response body: {}", e)))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<T> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Catalog POST");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Upstream(format!("Malformed response body: {}", e)))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/v1/search?q={}&filter={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            filter.as_str(),
            limit
        );
        let response: SearchResponse = self.get_json(url).await?;

        Ok(response
            .results
            .into_iter()
            .map(|hit| match hit {
                SearchHitDto::Song(dto) => SearchResult::Song(dto.into()),
                SearchHitDto::Artist { id, name } => SearchResult::Artist { id, name },
                SearchHitDto::Album { id, title, artist } => {
                    SearchResult::Album { id, title, artist }
                }
                SearchHitDto::Playlist { id, title } => {
                    SearchResult::Playlist(PlaylistRef { id, title })
                }
            })
            .collect())
    }

    async fn fetch_radio(&self, seed: &str) -> Result<Vec<SongCandidate>> {
        let url = format!("{}/v1/radio/{}", self.base_url, urlencoding::encode(seed));
        let response: TracksResponse = self.get_json(url).await?;
        Ok(response.tracks.into_iter().map(Into::into).collect())
    }

    async fn fetch_mood_taxonomy(&self) -> Result<Vec<MoodCategory>> {
        let url = format!("{}/v1/moods", self.base_url);
        let response: TaxonomyResponse = self.get_json(url).await?;

        tracing::info!(categories = response.categories.len(), "Fetched mood taxonomy");
        Ok(response.categories)
    }

    async fn fetch_mood_playlists(&self, category_id: &str) -> Result<Vec<PlaylistRef>> {
        let url = format!(
            "{}/v1/moods/{}/playlists",
            self.base_url,
            urlencoding::encode(category_id)
        );
        let response: PlaylistsResponse = self.get_json(url).await?;
        Ok(response.playlists)
    }

    async fn fetch_playlist_tracks(
        &self,
        playlist_id: &str,
        limit: usize,
    ) -> Result<Vec<SongCandidate>> {
        let url = format!(
            "{}/v1/playlists/{}/tracks?limit={}",
            self.base_url,
            urlencoding::encode(playlist_id),
            limit
        );
        let response: TracksResponse = self.get_json(url).await?;
        Ok(response.tracks.into_iter().map(Into::into).collect())
    }

    async fn create_playlist(&self, name: &str, description: Option<&str>) -> Result<String> {
        let url = format!("{}/v1/playlists", self.base_url);
        let body = json!({
            "name": name,
            "description": description,
        });
        let response: CreatedPlaylistResponse = self.post_json(url, body).await?;

        tracing::info!(playlist_id = %response.id, name = %name, "Created catalog playlist");
        Ok(response.id)
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<AddTracksOutcome> {
        let url = format!(
            "{}/v1/playlists/{}/tracks",
            self.base_url,
            urlencoding::encode(playlist_id)
        );
        let body = json!({ "track_ids": track_ids });
        self.post_json(url, body).await
    }
}
