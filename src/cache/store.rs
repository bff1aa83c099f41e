//! TTL response cache with a stale horizon.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::cache::CacheKey;
use crate::observability::metrics;
use crate::registry::ProviderId;

pub const DEFAULT_FRESH_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    provider: ProviderId,
    stored_at: Instant,
    fresh_until: Instant,
    stale_until: Instant,
    hit_count: u64,
}

/// A cached payload as seen by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub payload: Value,
    pub provider: ProviderId,
    pub is_stale: bool,
    pub age: Duration,
    pub hit_count: u64,
}

/// Thread-safe response cache, cheap to clone.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Arc<DashMap<CacheKey, CacheEntry>>,
    fresh_ttl: Duration,
    stale_ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESH_TTL, DEFAULT_STALE_TTL)
    }
}

impl ResponseCache {
    pub fn new(fresh_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            fresh_ttl,
            stale_ttl: stale_ttl.max(fresh_ttl),
        }
    }

    pub fn fresh_ttl(&self) -> Duration {
        self.fresh_ttl
    }

    pub fn stale_ttl(&self) -> Duration {
        self.stale_ttl
    }

    /// Fresh or stale entry within the stale horizon. Expired entries are
    /// evicted on the way.
    pub fn get(&self, key: &CacheKey) -> Option<CacheHit> {
        self.read(key, true)
    }

    /// Fresh entries only.
    pub fn get_fresh(&self, key: &CacheKey) -> Option<CacheHit> {
        self.read(key, false)
    }

    fn read(&self, key: &CacheKey, accept_stale: bool) -> Option<CacheHit> {
        let now = Instant::now();

        let hit = match self.inner.get_mut(key) {
            None => {
                metrics::record_cache_event("miss");
                return None;
            }
            Some(mut entry) if now < entry.stale_until => {
                let is_stale = now >= entry.fresh_until;
                if is_stale && !accept_stale {
                    metrics::record_cache_event("miss");
                    return None;
                }
                entry.hit_count += 1;
                Some(CacheHit {
                    payload: entry.payload.clone(),
                    provider: entry.provider.clone(),
                    is_stale,
                    age: now.saturating_duration_since(entry.stored_at),
                    hit_count: entry.hit_count,
                })
            }
            Some(_) => None,
        };

        match &hit {
            Some(hit) => metrics::record_cache_event(if hit.is_stale { "stale_hit" } else { "hit" }),
            None => {
                // Past the stale horizon; the guard above is already dropped.
                if self
                    .inner
                    .remove_if(key, |_, entry| now >= entry.stale_until)
                    .is_some()
                {
                    metrics::record_cache_event("evicted");
                    metrics::record_cache_size(self.inner.len());
                }
                metrics::record_cache_event("miss");
            }
        }
        hit
    }

    pub fn put(
        &self,
        key: CacheKey,
        payload: Value,
        provider: ProviderId,
        fresh_ttl: Option<Duration>,
        stale_ttl: Option<Duration>,
    ) {
        let now = Instant::now();
        let fresh = fresh_ttl.unwrap_or(self.fresh_ttl);
        let stale = stale_ttl.unwrap_or(self.stale_ttl).max(fresh);

        self.inner.insert(
            key,
            CacheEntry {
                payload,
                provider,
                stored_at: now,
                fresh_until: now + fresh,
                stale_until: now + stale,
                hit_count: 0,
            },
        );
        metrics::record_cache_size(self.inner.len());
    }

    /// Drop every entry past its stale horizon. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| now < entry.stale_until);
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Cache sweeper starting");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> CacheKey {
        CacheKey::new(
            &"market_price".into(),
            &crate::engine::request::FetchParams::from_pairs([("symbol", "BTC")]),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_then_stale_then_gone() {
        let cache = ResponseCache::default();
        cache.put(key(), json!({"price": 100.0}), "alpha".into(), None, None);

        time::advance(Duration::from_secs(30)).await;
        let hit = cache.get_fresh(&key()).expect("fresh at 30s");
        assert!(!hit.is_stale);
        assert_eq!(hit.provider.as_str(), "alpha");

        time::advance(Duration::from_secs(370)).await;
        assert!(cache.get_fresh(&key()).is_none());
        let hit = cache.get(&key()).expect("stale at 400s");
        assert!(hit.is_stale);
        assert_eq!(hit.age, Duration::from_secs(400));

        time::advance(Duration::from_secs(3600)).await;
        assert!(cache.get(&key()).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_ttl_overrides() {
        let cache = ResponseCache::default();
        cache.put(
            key(),
            json!(1),
            "alpha".into(),
            Some(Duration::from_secs(5)),
            Some(Duration::from_secs(10)),
        );

        time::advance(Duration::from_secs(6)).await;
        assert!(cache.get(&key()).unwrap().is_stale);
        time::advance(Duration::from_secs(5)).await;
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = ResponseCache::default();
        cache.put(key(), json!(1), "alpha".into(), None, Some(Duration::from_secs(100)));
        let other = CacheKey::new(&"news".into(), &Default::default());
        cache.put(other.clone(), json!(2), "beta".into(), None, None);

        time::advance(Duration::from_secs(101)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&other).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hits_are_counted() {
        let cache = ResponseCache::default();
        cache.put(key(), json!(1), "alpha".into(), None, None);

        cache.get(&key());
        let hit = cache.get(&key()).unwrap();
        assert_eq!(hit.hit_count, 2);
    }
}
