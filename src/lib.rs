//! # mixwright
//!
//! Request-orchestration core for a remote music catalog. Three pieces
//! carry all of the concurrency and failure-composition logic:
//!
//! - [`cache::ResultCache`]: time-bounded memoization with single-flight
//!   coalescing in front of every catalog call
//! - [`aggregate::fan_out`]: parallel fan-out that merges partial results
//!   deterministically instead of failing whole
//! - [`pipeline::SmartPlaylistPipeline`]: six-stage synthesis of a mood
//!   phrase into a concrete, optionally persisted playlist
//!
//! Everything reaches the catalog through the [`catalog::CatalogClient`]
//! trait; the catalog itself (latency, rate limits, auth) is an external
//! collaborator. The crate holds no state beyond the in-memory caches.
//!
//! ```rust,ignore
//! use mixwright::catalog::http::HttpCatalogClient;
//! use mixwright::{CatalogCaches, OrchestratorConfig, SmartPlaylistPipeline, SmartPlaylistRequest};
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(HttpCatalogClient::new("https://catalog.example/api", token)?);
//! let pipeline = SmartPlaylistPipeline::new(catalog, CatalogCaches::new(), OrchestratorConfig::default());
//! let report = pipeline.run(SmartPlaylistRequest::new("something chill", 10)).await;
//! ```

pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mood;
pub mod pipeline;
pub mod recommend;
pub mod types;

pub use aggregate::{fan_out, merge_candidates, AggregateOutcome};
pub use cache::{cache_key, CatalogCaches, ResultCache};
pub use catalog::{AddTracksOutcome, CatalogClient, SearchFilter, SearchResult};
pub use config::OrchestratorConfig;
pub use error::{CatalogError, PipelineError, Result};
pub use pipeline::{
    PipelineEvent, PipelineOutcome, PipelineReport, SmartPlaylistPipeline, SmartPlaylistRequest,
    Stage, StageLog, StageStatus,
};
pub use recommend::{AggregateReport, Recommender};
pub use types::{EnergyLevel, MoodCategory, PlaylistDraft, PlaylistRef, SongCandidate};
