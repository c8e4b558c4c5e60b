//! Core data types for catalog orchestration
//!
//! The unit of currency is `SongCandidate`: everything the aggregator
//! merges and the pipeline samples, filters, and persists is a list of
//! candidates. Identity for deduplication is the catalog id when present,
//! otherwise normalized title + artist.

use serde::{Deserialize, Serialize};

/// Duration below which a track is heuristically considered high energy
const HIGH_ENERGY_MAX_SECS: u32 = 210;
/// Duration above which a track is heuristically considered low energy
const LOW_ENERGY_MIN_SECS: u32 = 240;

/// Requested or derived energy level for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for EnergyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(EnergyLevel::Low),
            "medium" => Ok(EnergyLevel::Medium),
            "high" => Ok(EnergyLevel::High),
            other => Err(format!("Unknown energy level: '{}'", other)),
        }
    }
}

/// A single track as returned by the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongCandidate {
    /// Catalog track id (may be empty for unresolved search hits)
    pub id: String,
    /// Track title
    pub title: String,
    /// Primary artist name
    pub artist: String,
    /// Track length in seconds, when the catalog reports one
    pub duration_seconds: Option<u32>,
    /// Heuristic energy classification; derived, not authoritative
    pub energy_hint: Option<EnergyLevel>,
}

impl SongCandidate {
    /// Create a candidate with its energy hint derived from the duration
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration_seconds: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            duration_seconds,
            energy_hint: derive_energy_hint(duration_seconds),
        }
    }

    /// Normalized identity key for deduplication
    ///
    /// Catalog id when present; otherwise lowercased, trimmed title+artist
    /// so the same song surfaced by two playlists collapses to one entry.
    pub fn identity_key(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        format!(
            "{}|{}",
            self.title.trim().to_lowercase(),
            self.artist.trim().to_lowercase()
        )
    }
}

/// Derive an energy hint from track duration
///
/// Short tracks lean high energy, long tracks lean low. No duration means
/// no hint; the energy filter ranks hintless candidates lower rather than
/// excluding them.
pub fn derive_energy_hint(duration_seconds: Option<u32>) -> Option<EnergyLevel> {
    let secs = duration_seconds?;
    if secs == 0 {
        return None;
    }
    Some(if secs < HIGH_ENERGY_MAX_SECS {
        EnergyLevel::High
    } else if secs > LOW_ENERGY_MIN_SECS {
        EnergyLevel::Low
    } else {
        EnergyLevel::Medium
    })
}

/// A mood/genre category from the catalog taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodCategory {
    /// Display label (e.g. "Chill", "Workout")
    pub label: String,
    /// Opaque catalog category id
    pub id: String,
}

/// Reference to a catalog playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    /// Opaque catalog playlist id
    pub id: String,
    /// Playlist title
    pub title: String,
}

/// Accumulator for one smart-playlist run
///
/// Fields are appended as stages complete and never rolled back; a stage
/// failure halts progression with earlier state intact.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaylistDraft {
    /// The caller's free-text mood phrase
    pub mood_phrase: String,
    /// Category picked in the match stage
    pub matched_category: Option<MoodCategory>,
    /// Merged, deduplicated candidates from pool sampling
    pub candidate_pool: Vec<SongCandidate>,
    /// Post-filter, size-truncated selection
    pub filtered: Vec<SongCandidate>,
    /// Whether a catalog playlist was created for this run
    pub persisted: bool,
    /// Id of the created playlist, when persisted
    pub playlist_id: Option<String>,
}
