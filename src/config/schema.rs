//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for feedgate.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::load_balancer::{PoolMember, StrategyKind};
use crate::registry::Category;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeedgateConfig {
    /// Public HTTP listener.
    pub server: ServerConfig,

    /// Engine-wide fetch behaviour.
    pub engine: EngineConfig,

    /// Upstream data providers.
    #[serde(rename = "provider")]
    pub providers: Vec<ProviderConfig>,

    /// One pool per category.
    #[serde(rename = "pool")]
    pub pools: Vec<PoolConfig>,

    pub circuit_breaker: CircuitBreakerSettings,

    pub rate_limit: RateLimitConfig,

    pub proxy: ProxyConfig,

    pub health_check: HealthCheckConfig,

    pub cache: CacheConfig,

    pub cross_validation: CrossValidationSettings,

    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Hard limit on any inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline applied to fetches that bring none. 0 disables it.
    pub default_deadline_ms: u64,

    /// Capacity of the recent-attempts ring.
    pub attempt_log_capacity: usize,

    /// Capacity of each pool's rotation history.
    pub rotation_history_capacity: usize,

    /// Average latency above which FastestResponse treats a provider as slow.
    pub slow_latency_threshold_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 10_000,
            attempt_log_capacity: 1_000,
            rotation_history_capacity: 10_000,
            slow_latency_threshold_ms: 2_000,
        }
    }
}

/// One upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider identifier.
    pub id: String,

    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    pub category: Category,

    /// Base URL; request paths are joined onto it.
    pub base_url: String,

    #[serde(default)]
    pub requires_auth: bool,

    #[serde(default)]
    pub supports_proxy: bool,

    #[serde(default)]
    pub rate_limit: ProviderRateLimit,

    /// Higher is preferred by the Priority strategy.
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// How requests are built and responses parsed.
    #[serde(default)]
    pub adapter: AdapterConfig,
}

fn default_weight() -> u32 {
    1
}

fn default_provider_timeout_ms() -> u64 {
    5_000
}

/// Request budget of one provider.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderRateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for ProviderRateLimit {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Settings of the built-in JSON adapter.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Path template joined onto `base_url`, e.g. `"simple/{symbol}"`.
    pub path: String,

    /// Query parameter templates, e.g. `vs_currency = "{vs}"`.
    pub query: BTreeMap<String, String>,

    /// Append fetch params not consumed by a template as query parameters.
    pub forward_params: bool,

    /// JSON pointer to the payload inside the response body.
    pub pointer: Option<String>,

    /// Path probed by the health monitor; `base_url` when unset.
    pub probe_path: Option<String>,

    /// Environment variable holding the credential.
    pub auth_env: Option<String>,

    /// Header carrying the credential.
    pub auth_header: Option<String>,

    /// Prefix for the header value, e.g. `"Bearer "`.
    pub auth_prefix: Option<String>,

    /// Query parameter carrying the credential.
    pub auth_query: Option<String>,
}

/// A pool definition. Also the body of `POST /admin/pools`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PoolConfig {
    pub id: String,

    pub category: Category,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub members: Vec<PoolMember>,

    /// RNG seed for WeightedRandom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Overrides `engine.slow_latency_threshold_ms` for this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_latency_threshold_ms: Option<u64>,

    /// Overrides `cache.fresh_ttl_secs` for this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fresh_ttl_secs: Option<u64>,

    /// Overrides `cache.stale_ttl_secs` for this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Base open duration in seconds.
    pub cooldown_secs: u64,

    /// Ceiling for the escalated open duration in seconds.
    pub max_cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
            max_cooldown_secs: 600,
        }
    }
}

/// 429 handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Backoff after the 1st, 2nd, 3rd... consecutive 429. The last step
    /// repeats.
    pub backoff_schedule_secs: Vec<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backoff_schedule_secs: vec![120, 240, 600],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// Standard HTTP(S) forward proxy.
    #[default]
    Forward,
    /// URL-prefix relay: `<url><urlencoded target>`.
    Relay,
}

/// Fallback route for providers that reject direct requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,

    pub mode: ProxyMode,

    /// Proxy URL (forward) or relay prefix (relay).
    pub url: Option<String>,

    /// How long a "needs proxy" decision sticks, in seconds.
    pub decision_ttl_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ProxyMode::Forward,
            url: None,
            decision_ttl_secs: 300,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub fresh_ttl_secs: u64,

    /// Entries are served stale until this age, once live providers fail.
    pub stale_ttl_secs: u64,

    /// Interval of the expired-entry sweeper in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 60,
            stale_ttl_secs: 3_600,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrossValidationSettings {
    pub max_sources: usize,
    pub min_sources: usize,
    /// Relative deviation from the median beyond which a value is an outlier.
    pub outlier_threshold: f64,
}

impl Default for CrossValidationSettings {
    fn default() -> Self {
        Self {
            max_sources: 3,
            min_sources: 2,
            outlier_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
