//! Time-bounded result cache with single-flight coalescing
//!
//! `ResultCache` sits in front of every catalog call. A live entry is
//! served without touching upstream; concurrent requesters for the same
//! key share exactly one in-flight populate; failures settle every waiter
//! but are never memoized, so the next caller retries upstream. If the
//! leading call is dropped before settling, its waiters reclaim the key
//! and one of them runs the populate itself.
//!
//! Expiry is lazy: an entry older than its TTL is treated as absent on
//! the read path, there is no background sweep. Interior state lives
//! behind a `std::sync::Mutex` that is never held across an await, so
//! unrelated keys never block each other while a populate runs.

use crate::error::Result;
use crate::types::{MoodCategory, PlaylistRef, SongCandidate};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Build a deterministic cache key from an operation name and its
/// normalized (trimmed, lowercased) argument parts.
pub fn cache_key(op: &str, parts: &[&str]) -> String {
    let mut key = op.to_string();
    for part in parts {
        key.push(':');
        key.push_str(&part.trim().to_lowercase());
    }
    key
}

/// A settled populate outcome, shared with every coalesced waiter
type Settled<T> = Option<Result<T>>;

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

struct CacheInner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, watch::Receiver<Settled<T>>>,
}

/// Removes the in-flight slot when the leading caller settles, including
/// when its future is dropped mid-populate, so a key can never wedge.
struct InFlightGuard<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
    key: String,
}

impl<T> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight.remove(&self.key);
        }
    }
}

/// What the claim step decided for a caller
enum Claim<T> {
    /// Live entry; value already cloned out
    Hit(T),
    /// Someone else is populating this key; await their outcome
    Wait(watch::Receiver<Settled<T>>),
    /// This caller runs the populate and publishes the outcome
    Lead {
        tx: watch::Sender<Settled<T>>,
        guard: InFlightGuard<T>,
    },
}

/// Keyed, TTL-bounded memoization with single-flight coalescing
pub struct ResultCache<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
}

impl<T> Clone for ResultCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Number of live-or-stale entries currently held (diagnostics)
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(prefix = %prefix, removed, "Invalidated cache entries");
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ResultCache<T> {
    /// Return the cached value for `key`, or run `populate` to produce it.
    ///
    /// Guarantees:
    /// - a non-expired entry is returned without invoking `populate`
    /// - N concurrent callers for the same key trigger exactly one
    ///   `populate`; all observe the same settled result
    /// - failures settle waiters but are not cached; the next caller
    ///   after settling retries upstream
    /// - a waiter whose leader is dropped without settling re-enters the
    ///   claim, so one of the survivors retries upstream
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        populate: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let mut rx = match self.claim(key, ttl) {
                Claim::Hit(value) => {
                    trace!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Claim::Wait(rx) => rx,
                Claim::Lead { tx, guard } => {
                    debug!(key = %key, "Cache miss, populating");
                    let result = populate().await;

                    if let Ok(ref value) = result {
                        let mut inner = self.inner.lock().unwrap();
                        inner.entries.insert(
                            key.to_string(),
                            CacheEntry {
                                value: value.clone(),
                                inserted_at: Instant::now(),
                            },
                        );
                    }

                    // Release waiters before the guard frees the slot; send
                    // only errs when no waiter exists, which is fine.
                    let _ = tx.send(Some(result.clone()));
                    drop(guard);
                    return result;
                }
            };

            debug!(key = %key, "Coalescing onto in-flight catalog call");
            loop {
                if let Some(result) = rx.borrow_and_update().clone() {
                    return result;
                }
                if rx.changed().await.is_err() {
                    // Leader dropped without publishing; its guard has
                    // already freed the slot. Claim again and take over.
                    debug!(key = %key, "In-flight leader abandoned, reclaiming");
                    break;
                }
            }
        }
    }

    /// Decide hit/wait/lead under the lock; never awaits.
    fn claim(&self, key: &str, ttl: Duration) -> Claim<T> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.entries.get(key) {
            if entry.inserted_at.elapsed() < ttl {
                return Claim::Hit(entry.value.clone());
            }
            // Lazy eviction: expired entries are treated as absent
            trace!(key = %key, "Cache entry expired");
            inner.entries.remove(key);
        }

        if let Some(rx) = inner.in_flight.get(key) {
            return Claim::Wait(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        inner.in_flight.insert(key.to_string(), rx);

        Claim::Lead {
            tx,
            guard: InFlightGuard {
                inner: Arc::clone(&self.inner),
                key: key.to_string(),
            },
        }
    }
}

/// The typed caches shared by the recommender and the pipeline
///
/// One `ResultCache` per value shape; all three share the lifecycle of
/// the orchestrator that owns them.
#[derive(Clone, Default)]
pub struct CatalogCaches {
    /// Track lists: radio fetches, playlist tracks
    pub songs: ResultCache<Vec<SongCandidate>>,
    /// The mood/genre taxonomy
    pub taxonomy: ResultCache<Vec<MoodCategory>>,
    /// Playlist pools per mood category
    pub playlists: ResultCache<Vec<PlaylistRef>>,
}

impl CatalogCaches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[test]
    fn test_cache_key_normalizes_parts() {
        assert_eq!(cache_key("search", &["  Chill ", "SONGS"]), "search:chill:songs");
        assert_eq!(cache_key("mood_taxonomy", &[]), "mood_taxonomy");
    }

    #[tokio::test]
    async fn test_live_entry_served_without_populate() {
        let cache: ResultCache<u32> = ResultCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_populate("k", Duration::from_secs(60), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "Only the first call populates");
    }

    #[tokio::test]
    async fn test_expired_entry_repopulates() {
        let cache: ResultCache<u32> = ResultCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(20);

        let populate = |calls: Arc<AtomicUsize>| {
            move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as u32) }
        };

        let first = cache
            .get_or_populate("k", ttl, populate(Arc::clone(&calls)))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        let second = cache
            .get_or_populate("k", ttl, populate(Arc::clone(&calls)))
            .await
            .unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 1, "Expired entry must be repopulated");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_callers() {
        let cache: ResultCache<u32> = ResultCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate("k", Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "Concurrent callers for one key share a single populate"
        );
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: ResultCache<u32> = ResultCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_populate("k", Duration::from_secs(60), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CatalogError::RateLimited)
                })
                .await;
            assert_eq!(result, Err(CatalogError::RateLimited));
        }

        assert_eq!(
            calls.load(Ordering::SeqCst),
            2,
            "A failed populate must not be memoized"
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_waiters_share_a_failure() {
        let cache: ResultCache<u32> = ResultCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_populate("k", Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Err(CatalogError::Timeout)
                    })
                    .await
            })
        };

        // Give the leader time to claim the slot before the waiter arrives
        sleep(Duration::from_millis(10)).await;

        let waiter = cache
            .get_or_populate("k", Duration::from_secs(60), || async move {
                Ok(99) // must never run
            })
            .await;

        assert_eq!(leader.await.unwrap(), Err(CatalogError::Timeout));
        assert_eq!(waiter, Err(CatalogError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiter_reclaims_after_leader_is_aborted() {
        let cache: ResultCache<u32> = ResultCache::new();
        let waiter_calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_populate("k", Duration::from_secs(60), || async move {
                        sleep(Duration::from_secs(30)).await;
                        Ok(1)
                    })
                    .await
            })
        };

        // Let the leader claim the slot, then attach a waiter
        sleep(Duration::from_millis(10)).await;
        let waiter = {
            let cache = cache.clone();
            let waiter_calls = Arc::clone(&waiter_calls);
            tokio::spawn(async move {
                cache
                    .get_or_populate("k", Duration::from_secs(60), || async move {
                        waiter_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(2)
                    })
                    .await
            })
        };

        sleep(Duration::from_millis(10)).await;
        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(
            waiter.await.unwrap(),
            Ok(2),
            "A waiter must take over when its leader is dropped unsettled"
        );
        assert_eq!(waiter_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_keys_populate_in_parallel() {
        let cache: ResultCache<u32> = ResultCache::new();
        let start = Instant::now();

        let slow = |v: u32| async move {
            sleep(Duration::from_millis(50)).await;
            Ok(v)
        };

        let (a, b) = tokio::join!(
            cache.get_or_populate("a", Duration::from_secs(60), || slow(1)),
            cache.get_or_populate("b", Duration::from_secs(60), || slow(2)),
        );

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
        assert!(
            start.elapsed() < Duration::from_millis(95),
            "Per-key exclusion must not serialize unrelated keys"
        );
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache: ResultCache<u32> = ResultCache::new();
        let ttl = Duration::from_secs(60);

        cache.get_or_populate("pool:a", ttl, || async { Ok(1) }).await.unwrap();
        cache.get_or_populate("pool:b", ttl, || async { Ok(2) }).await.unwrap();
        cache.get_or_populate("radio:x", ttl, || async { Ok(3) }).await.unwrap();
        assert_eq!(cache.len(), 3);

        cache.invalidate_prefix("pool:");
        assert_eq!(cache.len(), 1);

        // Invalidated keys repopulate on next access
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        cache
            .get_or_populate("pool:a", ttl, || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(10)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
