//! Seed-based recommendation aggregation
//!
//! One radio fetch per seed entity, fanned out concurrently through the
//! cache, merged and deduplicated into a single candidate list. Branch
//! failures degrade the result instead of failing it; the report carries
//! them so the caller can decide whether "too few" is an error.

use crate::aggregate::{fan_out, merge_candidates};
use crate::cache::{cache_key, CatalogCaches};
use crate::catalog::{with_timeout, CatalogClient};
use crate::config::OrchestratorConfig;
use crate::error::CatalogError;
use crate::types::SongCandidate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Outcome of a recommendation fan-out
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    /// The seed entities the fan-out was based on
    pub based_on: Vec<String>,
    /// Merged, deduplicated candidates in seed order
    pub candidates: Vec<SongCandidate>,
    /// Per-seed failures; empty means every branch succeeded
    pub failures: Vec<CatalogError>,
    pub generated_at: DateTime<Utc>,
}

/// Caller-facing recommendation operation over the catalog
pub struct Recommender {
    catalog: Arc<dyn CatalogClient>,
    caches: CatalogCaches,
    config: OrchestratorConfig,
}

impl Recommender {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        caches: CatalogCaches,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            caches,
            config,
        }
    }

    /// Fetch radio candidates for every seed concurrently and merge them.
    ///
    /// Empty `seeds` yields an empty report, not an error. `ttl_override`
    /// replaces the configured default TTL for this call's cache reads.
    pub async fn recommendations(
        &self,
        seeds: &[String],
        limit: usize,
        ttl_override: Option<Duration>,
    ) -> AggregateReport {
        if seeds.is_empty() {
            return AggregateReport {
                based_on: Vec::new(),
                candidates: Vec::new(),
                failures: Vec::new(),
                generated_at: Utc::now(),
            };
        }

        let ttl = ttl_override.unwrap_or_else(|| self.config.default_ttl());
        let timeout = self.config.per_call_timeout();

        let tasks: Vec<_> = seeds
            .iter()
            .map(|seed| {
                let catalog = Arc::clone(&self.catalog);
                let cache = self.caches.songs.clone();
                let seed = seed.clone();
                move || async move {
                    let key = cache_key("radio", &[&seed]);
                    cache
                        .get_or_populate(&key, ttl, || {
                            with_timeout(timeout, async move {
                                catalog.fetch_radio(&seed).await
                            })
                        })
                        .await
                }
            })
            .collect();

        let outcome = fan_out(tasks, self.config.max_concurrent_fetches).await;
        let candidates = merge_candidates(outcome.successes, limit);

        info!(
            seeds = seeds.len(),
            candidates = candidates.len(),
            failures = outcome.failures.len(),
            "Recommendation fan-out complete"
        );

        AggregateReport {
            based_on: seeds.to_vec(),
            candidates,
            failures: outcome.failures,
            generated_at: Utc::now(),
        }
    }
}
