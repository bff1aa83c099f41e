//! Direct vs. proxied routing decisions.
//!
//! # Responsibilities
//! - Remember, per provider, that direct access recently failed in a way a
//!   relay can fix (geo block, CORS, refused connection, timeout)
//! - Expire that memory after a short TTL so direct access is retried
//!
//! # Design Decisions
//! - Decisions are only honoured for providers that declare proxy support
//!   and only when a relay is configured
//! - A successful direct attempt clears the decision immediately

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::registry::{ProviderId, ProviderRegistry};

pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(300);

/// Cached "needs proxy" decision for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProxyDecision {
    pub required: bool,
    pub expires_at: Option<Instant>,
    pub reason: Option<String>,
}

impl ProxyDecision {
    pub fn is_required(&self, now: Instant) -> bool {
        self.required && self.expires_at.is_some_and(|at| now < at)
    }
}

#[derive(Debug, Clone)]
pub struct ProxyRouter {
    registry: Arc<ProviderRegistry>,
    ttl: Duration,
    relay_available: bool,
}

impl ProxyRouter {
    pub fn new(registry: Arc<ProviderRegistry>, ttl: Duration, relay_available: bool) -> Self {
        Self {
            registry,
            ttl,
            relay_available,
        }
    }

    pub fn relay_available(&self) -> bool {
        self.relay_available
    }

    /// True when the provider may be routed through the relay at all.
    pub fn can_proxy(&self, id: &ProviderId) -> bool {
        self.relay_available
            && self
                .registry
                .get(id)
                .is_some_and(|entry| entry.descriptor().supports_proxy)
    }

    pub fn should_use_proxy(&self, id: &ProviderId) -> bool {
        if !self.can_proxy(id) {
            return false;
        }
        self.registry
            .get(id)
            .is_some_and(|entry| entry.with_state(|s| s.proxy.is_required(Instant::now())))
    }

    pub fn mark_needs_proxy(&self, id: &ProviderId, reason: &str) {
        let Some(entry) = self.registry.get(id) else {
            return;
        };
        let newly = entry.with_state(|s| {
            let now = Instant::now();
            let newly = !s.proxy.is_required(now);
            s.proxy = ProxyDecision {
                required: true,
                expires_at: Some(now + self.ttl),
                reason: Some(reason.to_string()),
            };
            newly
        });
        if newly {
            tracing::info!(
                provider = %id,
                reason,
                ttl_secs = self.ttl.as_secs(),
                "Routing provider through proxy"
            );
        }
    }

    pub fn mark_direct_ok(&self, id: &ProviderId) {
        if let Some(entry) = self.registry.get(id) {
            let was_required = entry.with_state(|s| {
                let was = s.proxy.required;
                s.proxy = ProxyDecision::default();
                was
            });
            if was_required {
                tracing::debug!(provider = %id, "Direct access restored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::JsonAdapter;
    use crate::registry::ProviderDescriptor;
    use url::Url;

    fn registry(supports_proxy: bool) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(
                ProviderDescriptor::new("binance", "market_price", Url::parse("http://127.0.0.1:9/").unwrap())
                    .with_proxy_support(supports_proxy),
                Arc::new(JsonAdapter::default()),
            )
            .unwrap();
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn decision_expires_after_ttl() {
        let router = ProxyRouter::new(registry(true), Duration::from_secs(300), true);
        let id = ProviderId::from("binance");

        assert!(!router.should_use_proxy(&id));
        router.mark_needs_proxy(&id, "geo_block");
        assert!(router.should_use_proxy(&id));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(!router.should_use_proxy(&id));
    }

    #[tokio::test]
    async fn direct_success_clears_decision() {
        let router = ProxyRouter::new(registry(true), DEFAULT_DECISION_TTL, true);
        let id = ProviderId::from("binance");

        router.mark_needs_proxy(&id, "timeout");
        router.mark_direct_ok(&id);
        assert!(!router.should_use_proxy(&id));
    }

    #[tokio::test]
    async fn ignored_without_relay_or_support() {
        let id = ProviderId::from("binance");

        let no_relay = ProxyRouter::new(registry(true), DEFAULT_DECISION_TTL, false);
        no_relay.mark_needs_proxy(&id, "timeout");
        assert!(!no_relay.should_use_proxy(&id));

        let unsupported = ProxyRouter::new(registry(false), DEFAULT_DECISION_TTL, true);
        unsupported.mark_needs_proxy(&id, "timeout");
        assert!(!unsupported.should_use_proxy(&id));
    }
}
