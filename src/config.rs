//! Orchestrator configuration
//!
//! Tunables for cache TTLs, per-call timeouts, and fan-out bounds.
//! Loadable from a TOML file; all durations are expressed in seconds in
//! the file and exposed as `Duration` accessors here.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the catalog orchestration layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default cache TTL in seconds (applies when no per-call override is given)
    pub default_ttl_secs: u64,
    /// Mood taxonomy cache TTL in seconds (taxonomy changes rarely)
    pub taxonomy_ttl_secs: u64,
    /// Mood playlist pool cache TTL in seconds
    pub pool_ttl_secs: u64,
    /// Per-upstream-call timeout in seconds
    pub per_call_timeout_secs: u64,
    /// Upper bound on concurrent catalog fetches in one fan-out
    pub max_concurrent_fetches: usize,
    /// Number of playlists sampled from a mood pool
    pub max_pool_playlists: usize,
    /// Minimum mood-match score (0.0-1.0) below which a run fails
    pub min_match_score: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            taxonomy_ttl_secs: 3600,
            pool_ttl_secs: 300,
            per_call_timeout_secs: 10,
            max_concurrent_fetches: 4,
            max_pool_playlists: 4,
            min_match_score: 0.5,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable the orchestrator outright
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_concurrent_fetches > 0,
            "max_concurrent_fetches must be at least 1"
        );
        anyhow::ensure!(
            self.max_pool_playlists > 0,
            "max_pool_playlists must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.min_match_score),
            "min_match_score must be within 0.0-1.0"
        );
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn taxonomy_ttl(&self) -> Duration {
        Duration::from_secs(self.taxonomy_ttl_secs)
    }

    pub fn pool_ttl(&self) -> Duration {
        Duration::from_secs(self.pool_ttl_secs)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.taxonomy_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.max_pool_playlists, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.toml");
        std::fs::write(
            &path,
            "default_ttl_secs = 60\nmax_pool_playlists = 2\nmin_match_score = 0.3\n",
        )
        .unwrap();

        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.default_ttl_secs, 60);
        assert_eq!(config.max_pool_playlists, 2);
        assert_eq!(config.min_match_score, 0.3);
        // Unspecified fields keep their defaults
        assert_eq!(config.taxonomy_ttl_secs, 3600);
    }

    #[test]
    fn test_load_missing_file() {
        let result = OrchestratorConfig::load(Path::new("/nonexistent/orchestrator.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_fan_out() {
        let config = OrchestratorConfig {
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_score() {
        let config = OrchestratorConfig {
            min_match_score: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
