//! Error types for mixwright
//!
//! Two layers: `CatalogError` covers anything an upstream catalog call can
//! come back with, `PipelineError` adds the terminal conditions that only
//! the smart-playlist pipeline can produce.
//!
//! Both are `Clone` so a single settled outcome can be shared with every
//! coalesced waiter on a cache key.

use serde::Serialize;
use thiserror::Error;

/// Result type for catalog-backed operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Failure kinds for a single catalog call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum CatalogError {
    /// Credentials missing, expired, or rejected by the catalog
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Catalog throttled the request
    #[error("Rate limited by catalog")]
    RateLimited,

    /// Per-call deadline elapsed before the catalog answered
    #[error("Catalog request timed out")]
    Timeout,

    /// Any other upstream failure (5xx, malformed body, network error)
    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Failure kinds for a smart-playlist run
///
/// Catalog failures propagate unchanged; the remaining variants are
/// pipeline-terminal conditions with no upstream counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum PipelineError {
    /// An underlying catalog call failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// No mood category scored above the match threshold
    #[error("No mood category matched phrase '{phrase}'")]
    NoMoodMatch { phrase: String },

    /// The matched category yielded no playlists, or sampling them
    /// yielded no tracks
    #[error("No candidates available for category '{category}'")]
    EmptyPool { category: String },
}
