//! Parallel fan-out aggregation
//!
//! Issues independent catalog tasks concurrently, waits for every branch
//! to settle, and merges successes while keeping per-branch failures as
//! diagnostics. A branch failure never escalates into a whole-call
//! failure; deciding whether "too few successes" is an error belongs to
//! the caller.
//!
//! Output order always matches input task order regardless of completion
//! timing, so a given input set produces a reproducible merge.

use crate::error::{CatalogError, Result};
use crate::types::SongCandidate;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, warn};

/// Settled fan-out: successes in input order, failures as diagnostics
#[derive(Debug)]
pub struct AggregateOutcome<T> {
    pub successes: Vec<T>,
    pub failures: Vec<CatalogError>,
}

impl<T> AggregateOutcome<T> {
    /// True when not a single branch succeeded
    pub fn all_failed(&self) -> bool {
        self.successes.is_empty() && !self.failures.is_empty()
    }
}

/// Run all tasks concurrently (at most `max_concurrent` in flight) and
/// wait for every one to settle.
///
/// `buffered` launches in input order and yields in input order, which
/// keeps the merge deterministic even when branches complete out of
/// order. No branch is cancelled because a sibling failed.
pub async fn fan_out<T, F, Fut>(tasks: Vec<F>, max_concurrent: usize) -> AggregateOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let task_count = tasks.len();
    let results: Vec<Result<T>> = stream::iter(tasks)
        .map(|task| task())
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    let mut successes = Vec::with_capacity(task_count);
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => {
                warn!(error = %e, "Fan-out branch failed");
                failures.push(e);
            }
        }
    }

    debug!(
        total = task_count,
        succeeded = successes.len(),
        failed = failures.len(),
        "Fan-out settled"
    );

    AggregateOutcome { successes, failures }
}

/// Merge candidate lists in input order, deduplicating by normalized
/// identity (first occurrence wins) and truncating to `limit`.
pub fn merge_candidates(lists: Vec<Vec<SongCandidate>>, limit: usize) -> Vec<SongCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for list in lists {
        for candidate in list {
            if merged.len() >= limit {
                return merged;
            }
            if seen.insert(candidate.identity_key()) {
                merged.push(candidate);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn song(id: &str) -> SongCandidate {
        SongCandidate::new(id, format!("Title {}", id), "Artist", Some(220))
    }

    #[tokio::test]
    async fn test_fan_out_preserves_input_order() {
        // First task finishes last; output order must still be input order
        let timings = vec![(60u64, "first"), (5, "second"), (20, "third")];
        let tasks: Vec<_> = timings
            .into_iter()
            .map(|(delay_ms, value)| {
                move || async move {
                    sleep(Duration::from_millis(delay_ms)).await;
                    Ok(value)
                }
            })
            .collect();

        let outcome = fan_out(tasks, 4).await;
        assert_eq!(outcome.successes, vec!["first", "second", "third"]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_excludes_failures_keeps_order() {
        enum Step {
            Ok(&'static str),
            Fail,
        }
        let steps = vec![Step::Ok("t0"), Step::Fail, Step::Ok("t2"), Step::Ok("t3")];
        let tasks: Vec<_> = steps
            .into_iter()
            .map(|step| {
                move || async move {
                    match step {
                        Step::Ok(v) => Ok(v),
                        Step::Fail => Err(CatalogError::Upstream("branch down".to_string())),
                    }
                }
            })
            .collect();

        let outcome = fan_out(tasks, 4).await;
        assert_eq!(outcome.successes, vec!["t0", "t2", "t3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn test_fan_out_all_failures_reports_not_raises() {
        let tasks: Vec<_> = (0..3)
            .map(|_| || async { Err::<u32, _>(CatalogError::Timeout) })
            .collect();

        let outcome = fan_out(tasks, 2).await;
        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.all_failed());
    }

    #[tokio::test]
    async fn test_fan_out_respects_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }
            })
            .collect();

        let outcome = fan_out(tasks, 2).await;
        assert_eq!(outcome.successes.len(), 6);
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "No more than max_concurrent branches may run at once"
        );
    }

    #[test]
    fn test_merge_dedup_first_occurrence_wins() {
        let mut dup = song("a");
        dup.title = "Same song, other playlist".to_string();

        let merged = merge_candidates(vec![vec![song("a"), song("b")], vec![dup, song("c")]], 10);
        let ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[0].title, "Title a", "First-seen instance is retained");
    }

    #[test]
    fn test_merge_dedup_by_normalized_title_artist() {
        let a = SongCandidate::new("", "Midnight City", "M83", Some(240));
        let b = SongCandidate::new("", "  MIDNIGHT CITY ", "m83", Some(240));

        let merged = merge_candidates(vec![vec![a], vec![b]], 10);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_truncates_to_limit() {
        let lists = vec![
            (0..8).map(|i| song(&format!("x{}", i))).collect::<Vec<_>>(),
            (0..8).map(|i| song(&format!("y{}", i))).collect::<Vec<_>>(),
        ];
        let merged = merge_candidates(lists, 10);
        assert_eq!(merged.len(), 10);
        assert_eq!(merged[0].id, "x0");
        assert_eq!(merged[9].id, "y1");
    }
}
