//! Time-bounded result cache
//!
//! Fronts profile builds and summary listings. One instance lives in the
//! engine state; every successful write calls `invalidate_all()` before
//! returning, so a caller never reads stale data across its own write.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: operation name plus its serialized parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub params: String,
}

impl CacheKey {
    pub fn new(operation: &'static str, params: impl Into<String>) -> Self {
        Self {
            operation,
            params: params.into(),
        }
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Bumped by every invalidation
    generation: u64,
}

/// Process-wide TTL cache
pub struct ResultCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").field("ttl", &self.ttl).finish()
    }
}

impl ResultCache {
    /// Create a cache; a zero TTL disables caching entirely
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached value for `key`, or compute and store it
    ///
    /// `compute` runs without the cache lock held. Errors are returned
    /// as-is and never cached. A value computed while an invalidation
    /// happened is returned to its caller but not stored.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: CacheKey, compute: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.ttl.is_zero() {
            return compute().await;
        }

        let generation = {
            let mut state = self.lock();
            let now = Instant::now();
            match state.entries.get(&key) {
                Some(entry) if entry.expires_at > now => {
                    if let Some(value) = entry.value.downcast_ref::<T>() {
                        debug!(operation = key.operation, "Cache hit");
                        return Ok(value.clone());
                    }
                }
                Some(_) => {
                    state.entries.remove(&key);
                }
                None => {}
            }
            state.generation
        };

        let value = compute().await?;

        let mut state = self.lock();
        if state.generation == generation {
            state.entries.insert(
                key,
                CacheEntry {
                    value: Arc::new(value.clone()),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        Ok(value)
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
        debug!("Result cache invalidated");
    }

    /// Number of stored entries (expired ones included until next access)
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn counted(cache: &ResultCache, calls: &AtomicUsize, key: &str) -> u32 {
        cache
            .get_or_compute(CacheKey::new("test", key), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<u32, String>(n as u32)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls, "a").await, 1);
        assert_eq!(counted(&cache, &calls, "a").await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Different params are a different key
        assert_eq!(counted(&cache, &calls, "b").await, 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls, "a").await, 1);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(counted(&cache, &calls, "a").await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let cache = ResultCache::new(Duration::from_millis(30));
        let calls = AtomicUsize::new(0);

        counted(&cache, &calls, "a").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counted(&cache, &calls, "a").await, 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let cache = ResultCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        counted(&cache, &calls, "a").await;
        counted(&cache, &calls, "a").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first: Result<u32, String> = cache
            .get_or_compute(CacheKey::new("test", "e"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;
        assert!(first.is_err());

        assert_eq!(counted(&cache, &calls, "e").await, 2);
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_skips_store() {
        let cache = ResultCache::new(Duration::from_secs(60));

        let value: Result<u32, String> = cache
            .get_or_compute(CacheKey::new("test", "race"), || async {
                cache.invalidate_all();
                Ok(7)
            })
            .await;
        assert_eq!(value, Ok(7));
        assert!(cache.is_empty());
    }
}
