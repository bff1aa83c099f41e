//! Per-provider request budgets and 429 backoff.
//!
//! Each provider declares `max_requests` per `window`. Budgets are counted
//! in fixed windows starting at the first request. A 429 from upstream puts
//! the provider in backoff following the stepped schedule in
//! [`RateLimitBackoff`]; nothing is admitted until the backoff expires.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;
use crate::registry::{ProviderId, ProviderRegistry, RateLimit};
use crate::resilience::backoff::RateLimitBackoff;

/// Why a provider was refused budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDenial {
    /// Declared budget for the current window is spent.
    Exhausted { resets_in: Duration },
    /// Upstream answered 429 recently.
    Backoff { remaining: Duration },
}

/// Fixed-window counter plus 429 escalation state.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    pub window_started: Option<Instant>,
    pub used: u32,
    /// Budget denials plus upstream 429s.
    pub hits: u64,
    pub consecutive_limited: u32,
    pub backoff_until: Option<Instant>,
}

impl RateWindow {
    pub fn in_backoff(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    fn roll(&mut self, limit: &RateLimit, now: Instant) {
        let expired = self
            .window_started
            .map_or(true, |started| now.saturating_duration_since(started) >= limit.window);
        if expired {
            self.window_started = Some(now);
            self.used = 0;
        }
    }

    /// Check budget without consuming it. Denials are counted as hits.
    pub fn check(&mut self, limit: &RateLimit, now: Instant) -> Result<(), RateDenial> {
        if let Some(until) = self.backoff_until {
            if now < until {
                return Err(RateDenial::Backoff {
                    remaining: until - now,
                });
            }
        }

        self.roll(limit, now);
        if self.used >= limit.max_requests {
            self.hits += 1;
            let resets_in = self
                .window_started
                .map(|started| (started + limit.window).saturating_duration_since(now))
                .unwrap_or_default();
            return Err(RateDenial::Exhausted { resets_in });
        }
        Ok(())
    }

    /// Consume one request from the budget.
    pub fn acquire(&mut self, limit: &RateLimit, now: Instant) -> Result<(), RateDenial> {
        self.check(limit, now)?;
        self.used += 1;
        Ok(())
    }

    /// Register an upstream 429 and return the backoff now in force.
    pub fn limited(&mut self, backoff: &RateLimitBackoff, now: Instant) -> Duration {
        self.hits += 1;
        self.consecutive_limited = self.consecutive_limited.saturating_add(1);
        let delay = backoff.delay_for(self.consecutive_limited);
        self.backoff_until = Some(now + delay);
        delay
    }

    pub fn succeeded(&mut self) {
        self.consecutive_limited = 0;
    }
}

/// Registry-backed rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    registry: Arc<ProviderRegistry>,
    backoff: RateLimitBackoff,
}

impl RateLimiter {
    pub fn new(registry: Arc<ProviderRegistry>, backoff: RateLimitBackoff) -> Self {
        Self { registry, backoff }
    }

    /// Peek at the budget.
    pub fn check(&self, id: &ProviderId) -> Result<(), RateDenial> {
        self.with_window(id, |window, limit, now| window.check(limit, now))
    }

    pub fn has_budget(&self, id: &ProviderId) -> bool {
        self.check(id).is_ok()
    }

    /// Consume budget for one attempt.
    pub fn acquire(&self, id: &ProviderId) -> Result<(), RateDenial> {
        self.with_window(id, |window, limit, now| window.acquire(limit, now))
    }

    pub fn try_acquire(&self, id: &ProviderId) -> bool {
        self.acquire(id).is_ok()
    }

    pub fn record_rate_limited(&self, id: &ProviderId) -> Duration {
        let Some(entry) = self.registry.get(id) else {
            return Duration::ZERO;
        };

        let (delay, consecutive) = entry.with_state(|s| {
            let delay = s.rate.limited(&self.backoff, Instant::now());
            (delay, s.rate.consecutive_limited)
        });

        if self.backoff.is_blacklisted(consecutive) {
            tracing::warn!(
                provider = %id,
                consecutive_429 = consecutive,
                backoff_secs = delay.as_secs(),
                "Provider blacklisted after repeated rate limiting"
            );
        } else {
            tracing::info!(
                provider = %id,
                consecutive_429 = consecutive,
                backoff_secs = delay.as_secs(),
                "Provider rate limited, backing off"
            );
        }
        metrics::record_rate_limit_hit(id.as_str());
        delay
    }

    pub fn record_success(&self, id: &ProviderId) {
        if let Some(entry) = self.registry.get(id) {
            entry.with_state(|s| s.rate.succeeded());
        }
    }

    pub fn backoff_remaining(&self, id: &ProviderId) -> Option<Duration> {
        let entry = self.registry.get(id)?;
        let now = Instant::now();
        entry.with_state(|s| {
            s.rate
                .backoff_until
                .filter(|until| now < *until)
                .map(|until| until - now)
        })
    }

    pub fn rate_limit_hits(&self, id: &ProviderId) -> u64 {
        self.registry
            .get(id)
            .map(|entry| entry.with_state(|s| s.rate.hits))
            .unwrap_or_default()
    }

    fn with_window(
        &self,
        id: &ProviderId,
        f: impl FnOnce(&mut RateWindow, &RateLimit, Instant) -> Result<(), RateDenial>,
    ) -> Result<(), RateDenial> {
        let Some(entry) = self.registry.get(id) else {
            return Err(RateDenial::Exhausted {
                resets_in: Duration::ZERO,
            });
        };
        let limit = entry.descriptor().rate_limit;
        let result = entry.with_state(|s| f(&mut s.rate, &limit, Instant::now()));
        if let Err(RateDenial::Exhausted { .. }) = result {
            metrics::record_rate_limit_hit(id.as_str());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::JsonAdapter;
    use crate::registry::ProviderDescriptor;
    use url::Url;

    #[test]
    fn fixed_window_budget() {
        let limit = RateLimit::new(2, Duration::from_secs(10));
        let mut window = RateWindow::default();
        let now = Instant::now();

        assert!(window.acquire(&limit, now).is_ok());
        assert!(window.check(&limit, now).is_ok());
        assert!(window.acquire(&limit, now).is_ok());
        assert!(matches!(
            window.acquire(&limit, now + Duration::from_secs(4)),
            Err(RateDenial::Exhausted { resets_in }) if resets_in == Duration::from_secs(6)
        ));
        assert_eq!(window.hits, 1);

        assert!(window.acquire(&limit, now + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn backoff_blocks_until_expiry_and_success_resets_escalation() {
        let limit = RateLimit::per_minute(100);
        let backoff = RateLimitBackoff::default();
        let mut window = RateWindow::default();
        let now = Instant::now();

        assert_eq!(window.limited(&backoff, now), Duration::from_secs(120));
        assert!(matches!(
            window.check(&limit, now + Duration::from_secs(119)),
            Err(RateDenial::Backoff { .. })
        ));
        assert!(window.check(&limit, now + Duration::from_secs(120)).is_ok());

        assert_eq!(window.limited(&backoff, now), Duration::from_secs(240));
        window.succeeded();
        assert_eq!(window.limited(&backoff, now), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_escalates_through_registry() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(
                ProviderDescriptor::new("alpha", "news", Url::parse("http://127.0.0.1:9/").unwrap()),
                Arc::new(JsonAdapter::default()),
            )
            .unwrap();
        let limiter = RateLimiter::new(registry, RateLimitBackoff::default());
        let id = ProviderId::from("alpha");

        assert_eq!(limiter.record_rate_limited(&id), Duration::from_secs(120));
        assert_eq!(limiter.record_rate_limited(&id), Duration::from_secs(240));
        assert_eq!(limiter.record_rate_limited(&id), Duration::from_secs(600));
        assert!(!limiter.has_budget(&id));
        assert_eq!(limiter.rate_limit_hits(&id), 3);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(limiter.try_acquire(&id));
        assert_eq!(limiter.backoff_remaining(&id), None);
    }
}
