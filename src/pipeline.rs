//! Smart playlist synthesis pipeline
//!
//! A strictly sequential six-stage workflow that turns a free-text mood
//! phrase into a concrete, optionally persisted playlist:
//!
//! 1. FetchTaxonomy - mood categories via cache (long TTL)
//! 2. MatchCategory - score the phrase against category labels
//! 3. FetchPool     - playlists of the matched category (short TTL)
//! 4. SamplePool    - fan out track fetches, merge and deduplicate
//! 5. FilterByEnergy- keep/rank by energy hint, never starve the output
//! 6. Persist       - optional playlist creation; failures here are soft
//!
//! No stage is retried internally and no stage starts before the prior
//! stage settled. Failures before stage 6 are terminal for the run;
//! stage 6 failures still complete the run with the candidate set and
//! the write trouble enumerated in the report.

use crate::aggregate::{fan_out, merge_candidates};
use crate::cache::{cache_key, CatalogCaches};
use crate::catalog::{with_timeout, CatalogClient};
use crate::config::OrchestratorConfig;
use crate::error::PipelineError;
use crate::mood;
use crate::types::{EnergyLevel, PlaylistDraft, PlaylistRef, SongCandidate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    FetchTaxonomy,
    MatchCategory,
    FetchPool,
    SamplePool,
    FilterByEnergy,
    Persist,
}

/// How a stage concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    Ok,
    /// Completed with degraded output (branch failures, partial writes)
    Partial,
    Skipped,
    Failed,
}

/// One line of the per-run stage journal
#[derive(Debug, Clone, Serialize)]
pub struct StageLog {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: Option<String>,
}

/// Progress events for an observing channel
#[derive(Debug, Clone, Serialize)]
pub enum PipelineEvent {
    StageStarted { stage: Stage, timestamp: i64 },
    StageCompleted { stage: Stage, timestamp: i64 },
    StageFailed { stage: Stage, error: String, timestamp: i64 },
}

/// Caller request for one smart-playlist run
#[derive(Debug, Clone)]
pub struct SmartPlaylistRequest {
    /// Free-text mood phrase (e.g. "something chill for the evening")
    pub mood_phrase: String,
    /// Optional energy filter
    pub energy: Option<EnergyLevel>,
    /// Requested playlist size
    pub size: usize,
    /// Whether to create the playlist in the catalog
    pub persist: bool,
    /// Playlist name override; defaults to "<Mood> Mix"
    pub name: Option<String>,
    /// Cache TTL override for this run's reads
    pub ttl_override: Option<Duration>,
}

impl SmartPlaylistRequest {
    pub fn new(mood_phrase: impl Into<String>, size: usize) -> Self {
        Self {
            mood_phrase: mood_phrase.into(),
            energy: None,
            size,
            persist: false,
            name: None,
            ttl_override: None,
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Serialize)]
pub enum PipelineOutcome {
    /// All required stages settled; the draft holds the candidate set
    Completed(PlaylistDraft),
    /// A stage before Persist failed; no partial playlist is reported
    Failed { error: PipelineError, stage: Stage },
}

/// Full report of one run: terminal outcome plus the stage journal
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub stages: Vec<StageLog>,
    /// Track ids that could not be added during persist (soft failure)
    pub rejected_tracks: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Completed(_))
    }

    /// The completed draft, when the run completed
    pub fn draft(&self) -> Option<&PlaylistDraft> {
        match &self.outcome {
            PipelineOutcome::Completed(draft) => Some(draft),
            PipelineOutcome::Failed { .. } => None,
        }
    }
}

/// Six-stage smart playlist builder over the catalog
pub struct SmartPlaylistPipeline {
    catalog: Arc<dyn CatalogClient>,
    caches: CatalogCaches,
    config: OrchestratorConfig,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl SmartPlaylistPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        caches: CatalogCaches,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            caches,
            config,
            event_tx: None,
        }
    }

    /// Attach a progress-event channel
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Execute one run to its terminal state
    pub async fn run(&self, request: SmartPlaylistRequest) -> PipelineReport {
        info!(
            mood = %request.mood_phrase,
            size = request.size,
            persist = request.persist,
            "Smart playlist run started"
        );

        let mut stages: Vec<StageLog> = Vec::new();
        let mut draft = PlaylistDraft {
            mood_phrase: request.mood_phrase.clone(),
            ..Default::default()
        };

        // Stage 1: FetchTaxonomy
        self.stage_started(Stage::FetchTaxonomy).await;
        let taxonomy_ttl = request
            .ttl_override
            .unwrap_or_else(|| self.config.taxonomy_ttl());
        let catalog = Arc::clone(&self.catalog);
        let timeout = self.config.per_call_timeout();
        let taxonomy = match self
            .caches
            .taxonomy
            .get_or_populate(&cache_key("mood_taxonomy", &[]), taxonomy_ttl, || {
                with_timeout(timeout, async move {
                    catalog.fetch_mood_taxonomy().await
                })
            })
            .await
        {
            Ok(taxonomy) => taxonomy,
            Err(e) => return self.fail(stages, Stage::FetchTaxonomy, e.into()).await,
        };
        self.stage_ok(
            &mut stages,
            Stage::FetchTaxonomy,
            format!("{} categories", taxonomy.len()),
        )
        .await;

        // Stage 2: MatchCategory
        self.stage_started(Stage::MatchCategory).await;
        let matched = match mood::match_category(
            &request.mood_phrase,
            &taxonomy,
            self.config.min_match_score,
        ) {
            Some((category, score)) => {
                self.stage_ok(
                    &mut stages,
                    Stage::MatchCategory,
                    format!("'{}' (score {:.2})", category.label, score),
                )
                .await;
                category.clone()
            }
            None => {
                let error = PipelineError::NoMoodMatch {
                    phrase: request.mood_phrase.clone(),
                };
                return self.fail(stages, Stage::MatchCategory, error).await;
            }
        };
        draft.matched_category = Some(matched.clone());

        // Stage 3: FetchPool
        self.stage_started(Stage::FetchPool).await;
        let pool_ttl = request
            .ttl_override
            .unwrap_or_else(|| self.config.pool_ttl());
        let catalog = Arc::clone(&self.catalog);
        let category_id = matched.id.clone();
        let pool = match self
            .caches
            .playlists
            .get_or_populate(
                &cache_key("mood_playlists", &[&matched.id]),
                pool_ttl,
                || {
                    with_timeout(timeout, async move {
                        catalog.fetch_mood_playlists(&category_id).await
                    })
                },
            )
            .await
        {
            Ok(pool) => pool,
            Err(e) => return self.fail(stages, Stage::FetchPool, e.into()).await,
        };
        if pool.is_empty() {
            let error = PipelineError::EmptyPool {
                category: matched.label.clone(),
            };
            return self.fail(stages, Stage::FetchPool, error).await;
        }
        self.stage_ok(
            &mut stages,
            Stage::FetchPool,
            format!("{} playlists", pool.len()),
        )
        .await;

        // Stage 4: SamplePool
        self.stage_started(Stage::SamplePool).await;
        let (merged, branch_failures) = self.sample_pool(&request, &pool).await;
        if merged.is_empty() {
            let error = PipelineError::EmptyPool {
                category: matched.label.clone(),
            };
            return self.fail(stages, Stage::SamplePool, error).await;
        }
        let sample_status = if branch_failures > 0 {
            StageStatus::Partial
        } else {
            StageStatus::Ok
        };
        stages.push(StageLog {
            stage: Stage::SamplePool,
            status: sample_status,
            detail: Some(format!(
                "{} unique candidates, {} fetch failures",
                merged.len(),
                branch_failures
            )),
        });
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::SamplePool,
            timestamp: Utc::now().timestamp(),
        })
        .await;
        draft.candidate_pool = merged;

        // Stage 5: FilterByEnergy
        self.stage_started(Stage::FilterByEnergy).await;
        let (filtered, fell_back) =
            apply_energy_filter(&draft.candidate_pool, request.energy, request.size);
        let filter_detail = match (request.energy, fell_back) {
            (None, _) => format!("no filter requested, truncated to {}", filtered.len()),
            (Some(_), true) => format!(
                "filter would have emptied the pool, fell back to {} unfiltered",
                filtered.len()
            ),
            (Some(_), false) => format!("{} candidates after filter", filtered.len()),
        };
        if fell_back {
            warn!(mood = %request.mood_phrase, "Energy filter fell back to unfiltered pool");
        }
        self.stage_ok(&mut stages, Stage::FilterByEnergy, filter_detail).await;
        draft.filtered = filtered;

        // Stage 6: Persist (optional, soft failures)
        let mut rejected_tracks = Vec::new();
        if request.persist {
            self.stage_started(Stage::Persist).await;
            rejected_tracks = self.persist(&request, &mut draft, &mut stages).await;
        } else {
            stages.push(StageLog {
                stage: Stage::Persist,
                status: StageStatus::Skipped,
                detail: Some("persist not requested".to_string()),
            });
        }

        info!(
            mood = %request.mood_phrase,
            tracks = draft.filtered.len(),
            persisted = draft.persisted,
            "Smart playlist run completed"
        );

        PipelineReport {
            outcome: PipelineOutcome::Completed(draft),
            stages,
            rejected_tracks,
            finished_at: Utc::now(),
        }
    }

    /// Stage 4 body: bounded concurrent track fetches over the first few
    /// pool playlists, merged and deduplicated. Returns the merge and the
    /// number of failed branches.
    async fn sample_pool(
        &self,
        request: &SmartPlaylistRequest,
        pool: &[PlaylistRef],
    ) -> (Vec<SongCandidate>, usize) {
        let selected: Vec<PlaylistRef> = pool
            .iter()
            .take(self.config.max_pool_playlists)
            .cloned()
            .collect();
        // Oversample so dedup and filtering still fill the request
        let per_fetch = request.size.saturating_mul(3);
        let ttl = request
            .ttl_override
            .unwrap_or_else(|| self.config.default_ttl());
        let timeout = self.config.per_call_timeout();

        debug!(
            playlists = selected.len(),
            per_fetch, "Sampling mood playlist pool"
        );

        let tasks: Vec<_> = selected
            .iter()
            .map(|playlist| {
                let catalog = Arc::clone(&self.catalog);
                let cache = self.caches.songs.clone();
                let playlist_id = playlist.id.clone();
                move || async move {
                    let key = cache_key(
                        "playlist_tracks",
                        &[&playlist_id, &per_fetch.to_string()],
                    );
                    cache
                        .get_or_populate(&key, ttl, || {
                            with_timeout(timeout, async move {
                                catalog
                                    .fetch_playlist_tracks(&playlist_id, per_fetch)
                                    .await
                            })
                        })
                        .await
                }
            })
            .collect();

        let outcome = fan_out(tasks, self.config.max_concurrent_fetches).await;
        let failures = outcome.failures.len();
        let merged = merge_candidates(outcome.successes, per_fetch);

        (merged, failures)
    }

    /// Stage 6 body. Every failure in here is soft: the run still
    /// completes, `draft.persisted` reflects reality, and the returned
    /// list enumerates track ids that did not make it into the playlist.
    async fn persist(
        &self,
        request: &SmartPlaylistRequest,
        draft: &mut PlaylistDraft,
        stages: &mut Vec<StageLog>,
    ) -> Vec<String> {
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| format!("{} Mix", title_case(&request.mood_phrase)));
        let description = match request.energy {
            Some(level) => format!(
                "Smart playlist for '{}' ({:?} energy)",
                request.mood_phrase, level
            ),
            None => format!("Smart playlist for '{}'", request.mood_phrase),
        };
        let track_ids: Vec<String> = draft
            .filtered
            .iter()
            .filter(|c| !c.id.is_empty())
            .map(|c| c.id.clone())
            .collect();
        let timeout = self.config.per_call_timeout();

        let playlist_id = match with_timeout(
            timeout,
            self.catalog.create_playlist(&name, Some(&description)),
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Playlist creation failed (soft)");
                stages.push(StageLog {
                    stage: Stage::Persist,
                    status: StageStatus::Failed,
                    detail: Some(format!("create failed: {}", e)),
                });
                self.emit(PipelineEvent::StageFailed {
                    stage: Stage::Persist,
                    error: e.to_string(),
                    timestamp: Utc::now().timestamp(),
                })
                .await;
                return track_ids;
            }
        };

        draft.playlist_id = Some(playlist_id.clone());
        draft.persisted = true;
        // A new playlist can change what the catalog reports for pools
        self.caches.playlists.invalidate_prefix("mood_playlists");

        match with_timeout(timeout, self.catalog.add_tracks(&playlist_id, &track_ids)).await {
            Ok(outcome) => {
                let status = if outcome.rejected.is_empty() {
                    StageStatus::Ok
                } else {
                    StageStatus::Partial
                };
                if !outcome.rejected.is_empty() {
                    warn!(
                        playlist_id = %playlist_id,
                        rejected = outcome.rejected.len(),
                        "Partial write: some tracks were rejected"
                    );
                }
                stages.push(StageLog {
                    stage: Stage::Persist,
                    status,
                    detail: Some(format!(
                        "playlist {}: {} added, {} rejected",
                        playlist_id,
                        outcome.added.len(),
                        outcome.rejected.len()
                    )),
                });
                self.emit(PipelineEvent::StageCompleted {
                    stage: Stage::Persist,
                    timestamp: Utc::now().timestamp(),
                })
                .await;
                outcome.rejected
            }
            Err(e) => {
                warn!(error = %e, playlist_id = %playlist_id, "Adding tracks failed (soft)");
                stages.push(StageLog {
                    stage: Stage::Persist,
                    status: StageStatus::Partial,
                    detail: Some(format!("playlist {} created, adds failed: {}", playlist_id, e)),
                });
                self.emit(PipelineEvent::StageFailed {
                    stage: Stage::Persist,
                    error: e.to_string(),
                    timestamp: Utc::now().timestamp(),
                })
                .await;
                track_ids
            }
        }
    }

    /// Terminal failure before stage 6: journal it and report
    async fn fail(
        &self,
        mut stages: Vec<StageLog>,
        stage: Stage,
        error: PipelineError,
    ) -> PipelineReport {
        warn!(stage = ?stage, error = %error, "Smart playlist run failed");
        stages.push(StageLog {
            stage,
            status: StageStatus::Failed,
            detail: Some(error.to_string()),
        });
        self.emit(PipelineEvent::StageFailed {
            stage,
            error: error.to_string(),
            timestamp: Utc::now().timestamp(),
        })
        .await;

        PipelineReport {
            outcome: PipelineOutcome::Failed { error, stage },
            stages,
            rejected_tracks: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    async fn stage_started(&self, stage: Stage) {
        debug!(stage = ?stage, "Stage started");
        self.emit(PipelineEvent::StageStarted {
            stage,
            timestamp: Utc::now().timestamp(),
        })
        .await;
    }

    async fn stage_ok(&self, stages: &mut Vec<StageLog>, stage: Stage, detail: String) {
        debug!(stage = ?stage, detail = %detail, "Stage completed");
        stages.push(StageLog {
            stage,
            status: StageStatus::Ok,
            detail: Some(detail),
        });
        self.emit(PipelineEvent::StageCompleted {
            stage,
            timestamp: Utc::now().timestamp(),
        })
        .await;
    }

    /// Emit a progress event if a channel is configured
    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Stage 5 policy: candidates matching the requested level first,
/// hint-less candidates ranked after them, mismatches dropped. If that
/// would empty the result the unfiltered pool is used instead, so
/// filtering degrades gracefully rather than starving the output.
/// Returns the size-truncated selection and whether the fallback fired.
fn apply_energy_filter(
    pool: &[SongCandidate],
    energy: Option<EnergyLevel>,
    size: usize,
) -> (Vec<SongCandidate>, bool) {
    let level = match energy {
        Some(level) => level,
        None => return (pool.iter().take(size).cloned().collect(), false),
    };

    let mut ranked: Vec<SongCandidate> = pool
        .iter()
        .filter(|c| c.energy_hint == Some(level))
        .cloned()
        .collect();
    ranked.extend(
        pool.iter()
            .filter(|c| c.energy_hint.is_none())
            .cloned(),
    );

    if ranked.is_empty() {
        return (pool.iter().take(size).cloned().collect(), true);
    }

    ranked.truncate(size);
    (ranked, false)
}

/// Capitalize the first letter of every word ("chill evening" -> "Chill Evening")
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
