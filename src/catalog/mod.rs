//! Catalog client boundary
//!
//! `CatalogClient` is the seam between the orchestration core and the
//! remote music catalog. The core treats the catalog as a black box with
//! its own rate limits and intermittent failures; everything it needs is
//! expressed by this trait, so tests script a mock and production wires
//! in [`http::HttpCatalogClient`].
//!
//! Every orchestrated call goes through [`with_timeout`]: an elapsed
//! deadline is reported as `CatalogError::Timeout` and propagates like
//! any other upstream failure, not as a distinct control-flow path.

pub mod http;

use crate::error::{CatalogError, Result};
use crate::types::{MoodCategory, PlaylistRef, SongCandidate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Search result type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFilter {
    Songs,
    Artists,
    Albums,
    Playlists,
    All,
}

impl SearchFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchFilter::Songs => "songs",
            SearchFilter::Artists => "artists",
            SearchFilter::Albums => "albums",
            SearchFilter::Playlists => "playlists",
            SearchFilter::All => "all",
        }
    }
}

/// One search hit; heterogeneous because the catalog mixes entity kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResult {
    Song(SongCandidate),
    Artist { id: String, name: String },
    Album { id: String, title: String, artist: String },
    Playlist(PlaylistRef),
}

/// Outcome of adding tracks to a playlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTracksOutcome {
    /// Track ids the catalog accepted
    pub added: Vec<String>,
    /// Track ids the catalog rejected
    pub rejected: Vec<String>,
}

/// One logical catalog operation per method; implementations own their
/// transport, credentials, and upstream rate limiting.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Free-text search, optionally filtered by entity kind
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Radio/similarity tracks for a seed entity (song or artist id)
    async fn fetch_radio(&self, seed: &str) -> Result<Vec<SongCandidate>>;

    /// The full mood/genre category taxonomy
    async fn fetch_mood_taxonomy(&self) -> Result<Vec<MoodCategory>>;

    /// Playlists belonging to one mood category
    async fn fetch_mood_playlists(&self, category_id: &str) -> Result<Vec<PlaylistRef>>;

    /// Tracks of one playlist, up to `limit`
    async fn fetch_playlist_tracks(
        &self,
        playlist_id: &str,
        limit: usize,
    ) -> Result<Vec<SongCandidate>>;

    /// Create a playlist, returning its catalog id
    async fn create_playlist(&self, name: &str, description: Option<&str>) -> Result<String>;

    /// Add tracks to an existing playlist
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String])
        -> Result<AddTracksOutcome>;
}

/// Bound an upstream call by a per-call deadline
///
/// Elapse maps to `CatalogError::Timeout` so timeouts flow through the
/// cache, aggregator, and pipeline exactly like any other failure.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "Catalog call timed out");
            Err(CatalogError::Timeout)
        }
    }
}
