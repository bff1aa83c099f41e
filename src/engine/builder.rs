//! Engine assembly.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::adapter::json::JsonAdapter;
use crate::adapter::ProviderAdapter;
use crate::cache::ResponseCache;
use crate::config::{FeedgateConfig, PoolConfig, ProviderConfig};
use crate::engine::attempt::{AttemptLog, DEFAULT_ATTEMPT_LOG_CAPACITY};
use crate::engine::cross_validator::{CrossValidationConfig, CrossValidator};
use crate::engine::fallback::{EngineSettings, FallbackEngine};
use crate::http::client::Transport;
use crate::load_balancer::{PoolDefaults, PoolError, PoolManager};
use crate::observability::{StatsSink, TracingSink};
use crate::registry::{ProviderDescriptor, ProviderRegistry, RateLimit, RegistryError};
use crate::resilience::backoff::RateLimitBackoff;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter};
use crate::routing::proxy::DEFAULT_DECISION_TTL;
use crate::routing::ProxyRouter;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("provider '{id}': {reason}")]
    InvalidProvider { id: String, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Collects providers, pools and tuning, then wires a [`FallbackEngine`].
pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    providers: Vec<(ProviderDescriptor, Arc<dyn ProviderAdapter>)>,
    pools: Vec<PoolConfig>,
    settings: EngineSettings,
    pool_defaults: PoolDefaults,
    circuit: CircuitBreakerConfig,
    backoff: RateLimitBackoff,
    proxy_ttl: Duration,
    cache: ResponseCache,
    attempt_log_capacity: usize,
    cross_validation: CrossValidationConfig,
    sink: Arc<dyn StatsSink>,
}

impl EngineBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            providers: Vec::new(),
            pools: Vec::new(),
            settings: EngineSettings::default(),
            pool_defaults: PoolDefaults::default(),
            circuit: CircuitBreakerConfig::default(),
            backoff: RateLimitBackoff::default(),
            proxy_ttl: DEFAULT_DECISION_TTL,
            cache: ResponseCache::default(),
            attempt_log_capacity: DEFAULT_ATTEMPT_LOG_CAPACITY,
            cross_validation: CrossValidationConfig::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Builder preloaded with everything in a validated config.
    pub fn from_config(
        config: &FeedgateConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, BuildError> {
        let mut builder = Self::new(transport)
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker.failure_threshold,
                cooldown: Duration::from_secs(config.circuit_breaker.cooldown_secs),
                max_cooldown: Duration::from_secs(config.circuit_breaker.max_cooldown_secs),
            })
            .rate_limit_backoff(RateLimitBackoff::from_secs(&config.rate_limit.backoff_schedule_secs))
            .proxy_decision_ttl(Duration::from_secs(config.proxy.decision_ttl_secs))
            .cache(ResponseCache::new(
                Duration::from_secs(config.cache.fresh_ttl_secs),
                Duration::from_secs(config.cache.stale_ttl_secs),
            ))
            .attempt_log_capacity(config.engine.attempt_log_capacity)
            .pool_defaults(PoolDefaults {
                history_capacity: config.engine.rotation_history_capacity,
                slow_latency_threshold: Duration::from_millis(config.engine.slow_latency_threshold_ms),
            })
            .cross_validation(CrossValidationConfig {
                max_sources: config.cross_validation.max_sources,
                min_sources: config.cross_validation.min_sources,
                outlier_threshold: config.cross_validation.outlier_threshold,
            })
            .settings(EngineSettings {
                default_deadline: (config.engine.default_deadline_ms > 0)
                    .then(|| Duration::from_millis(config.engine.default_deadline_ms)),
            });

        for provider in &config.providers {
            let descriptor = descriptor_from_config(provider)?;
            let adapter = Arc::new(JsonAdapter::new(provider.adapter.clone()));
            builder = builder.provider(descriptor, adapter);
        }
        for pool in &config.pools {
            builder = builder.pool(pool.clone());
        }
        Ok(builder)
    }

    pub fn provider(mut self, descriptor: ProviderDescriptor, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push((descriptor, adapter));
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn pool_defaults(mut self, defaults: PoolDefaults) -> Self {
        self.pool_defaults = defaults;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit = config;
        self
    }

    pub fn rate_limit_backoff(mut self, backoff: RateLimitBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn proxy_decision_ttl(mut self, ttl: Duration) -> Self {
        self.proxy_ttl = ttl;
        self
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn attempt_log_capacity(mut self, capacity: usize) -> Self {
        self.attempt_log_capacity = capacity;
        self
    }

    pub fn cross_validation(mut self, config: CrossValidationConfig) -> Self {
        self.cross_validation = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Result<FallbackEngine, BuildError> {
        let registry = Arc::new(ProviderRegistry::new());
        for (descriptor, adapter) in self.providers {
            registry.register(descriptor, adapter)?;
        }

        let pools = PoolManager::new(registry.clone(), self.pool_defaults);
        for pool in &self.pools {
            pools.create_pool(pool)?;
        }

        let relay_available = self.transport.proxy_available();
        tracing::info!(
            providers = registry.len(),
            pools = self.pools.len(),
            relay_available,
            "Fallback engine assembled"
        );

        Ok(FallbackEngine {
            settings: self.settings,
            circuit: CircuitBreaker::new(self.circuit, registry.clone()),
            limiter: RateLimiter::new(registry.clone(), self.backoff),
            proxy: ProxyRouter::new(registry.clone(), self.proxy_ttl, relay_available),
            registry,
            pools,
            cache: self.cache,
            transport: self.transport,
            attempts: AttemptLog::new(self.attempt_log_capacity),
            sink: self.sink,
            validator: CrossValidator::new(self.cross_validation),
        })
    }
}

fn descriptor_from_config(config: &ProviderConfig) -> Result<ProviderDescriptor, BuildError> {
    let base_url = Url::parse(&config.base_url).map_err(|e| BuildError::InvalidProvider {
        id: config.id.clone(),
        reason: format!("invalid base_url: {e}"),
    })?;

    Ok(ProviderDescriptor::new(config.id.clone(), config.category.clone(), base_url)
        .with_name(config.name.clone().unwrap_or_else(|| config.id.clone()))
        .with_auth(config.requires_auth)
        .with_proxy_support(config.supports_proxy)
        .with_rate_limit(RateLimit::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        ))
        .with_priority(config.priority)
        .with_weight(config.weight)
        .with_timeout(Duration::from_millis(config.timeout_ms)))
}
