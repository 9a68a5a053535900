//! # Source Cache
//!
//! Every fetcher owns exactly one `SourceCache`. It holds the last successful
//! fetch and the instant it was taken. The cache is created empty, filled on
//! the first successful fetch, and refreshed once its TTL runs out. Nothing is
//! persisted; the cache lives as long as the fetcher does.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What a fetcher answers with when a refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// Serve the last good records, however old.
    ServeStale,
    /// Serve nothing; stale data is worse than none for this source.
    ServeEmpty,
}

struct CacheEntry<T> {
    records: Arc<Vec<T>>,
    fetched_at: Instant,
    expired: bool,
}

/// # Source Cache
///
/// TTL-bound holder of one source's last good records.
///
/// An empty successful fetch is stored but never counts as fresh, so the next
/// call goes upstream again.
pub struct SourceCache<T> {
    ttl: Duration,
    policy: StalePolicy,
    entry: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> SourceCache<T> {
    /// Creates an empty cache.
    pub fn new(ttl: Duration, policy: StalePolicy) -> Self {
        Self {
            ttl,
            policy,
            entry: Mutex::new(None),
        }
    }

    /// Configured time to live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Configured stale policy.
    pub fn policy(&self) -> StalePolicy {
        self.policy
    }

    /// Records younger than the TTL, if any.
    pub fn fresh(&self) -> Option<Vec<T>> {
        let guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.as_ref()?;

        if entry.expired || entry.records.is_empty() || entry.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.records.as_ref().clone())
    }

    /// What to answer after a failed refresh, according to the stale policy.
    pub fn fallback(&self) -> Vec<T> {
        match self.policy {
            StalePolicy::ServeStale => self.last_good().unwrap_or_default(),
            StalePolicy::ServeEmpty => Vec::new(),
        }
    }

    /// The last stored records regardless of age.
    pub fn last_good(&self) -> Option<Vec<T>> {
        let guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|entry| entry.records.as_ref().clone())
    }

    /// Replaces the entry with a fresh fetch.
    pub fn store(&self, records: Vec<T>) {
        let mut guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(CacheEntry {
            records: Arc::new(records),
            fetched_at: Instant::now(),
            expired: false,
        });
    }

    /// Pre-populates the cache, e.g. from a test.
    pub fn seed(&self, records: Vec<T>) {
        self.store(records);
    }

    /// Keeps the records as last-good but forces the next call upstream.
    pub fn expire(&self) {
        let mut guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = guard.as_mut() {
            entry.expired = true;
        }
    }

    /// Drops everything.
    pub fn reset(&self) {
        let mut guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_is_never_fresh() {
        let cache: SourceCache<u32> = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeStale);
        assert!(cache.fresh().is_none());
        assert!(cache.fallback().is_empty());
    }

    #[test]
    fn test_fresh_within_ttl() {
        let cache = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeStale);
        cache.store(vec![1, 2, 3]);
        assert_eq!(cache.fresh(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_zero_ttl_always_refetches() {
        let cache = SourceCache::new(Duration::ZERO, StalePolicy::ServeStale);
        cache.store(vec![1]);
        assert!(cache.fresh().is_none());
        assert_eq!(cache.fallback(), vec![1]);
    }

    #[test]
    fn test_stored_empty_result_is_not_fresh() {
        let cache: SourceCache<u32> = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeStale);
        cache.store(Vec::new());
        assert!(cache.fresh().is_none());
        assert_eq!(cache.last_good(), Some(Vec::new()));
    }

    #[test]
    fn test_expire_keeps_last_good() {
        let cache = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeStale);
        cache.seed(vec!["a".to_string()]);
        cache.expire();

        assert!(cache.fresh().is_none());
        assert_eq!(cache.fallback(), vec!["a".to_string()]);
    }

    #[test]
    fn test_serve_empty_policy_ignores_stale_data() {
        let cache = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeEmpty);
        cache.seed(vec![7]);
        cache.expire();
        assert!(cache.fallback().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let cache = SourceCache::new(Duration::from_secs(60), StalePolicy::ServeStale);
        cache.seed(vec![7]);
        cache.reset();
        assert!(cache.last_good().is_none());
    }
}
