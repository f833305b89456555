use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::Result;

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    cached_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() >= ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// Single-flight TTL cache around an async computation.
///
/// One slot per key, each behind its own async lock. A caller that finds the
/// slot busy waits for the running computation and takes its result instead of
/// starting another one.
#[derive(Debug)]
pub struct ResultCache<K, V> {
    ttl: Mutex<Duration>,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: Mutex::new(ttl),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or run `compute` to produce it.
    ///
    /// Errors go only to the caller whose computation failed and are never
    /// stored. A caller that was waiting on that slot finds it empty and runs
    /// its own `compute`.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let requested_at = Instant::now();
        let ttl = *self.ttl.lock().await;
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(key.clone()).or_default().clone()
        };

        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.cached_at > requested_at {
                log::debug!("Cache join for {key:?}: reusing in-flight result");
                return Ok(cached.data.clone());
            }
            if !cached.is_stale(ttl) {
                log::debug!("Cache hit for {key:?}");
                return Ok(cached.data.clone());
            }
        }

        log::debug!("Cache miss for {key:?}");
        let data = compute().await?;
        *entry = Some(CacheEntry::new(data.clone()));
        Ok(data)
    }

    /// Drop every cached value. In-flight computations still complete.
    pub async fn invalidate(&self) {
        let slots = self.slots.lock().await;
        for slot in slots.values() {
            *slot.lock().await = None;
        }
        log::debug!("Cache invalidated ({} keys)", slots.len());
    }

    pub async fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().await = ttl;
    }
}
