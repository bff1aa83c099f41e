//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (pools reference existing providers)
//! - Validate value ranges (timeouts > 0, windows > 0, TTL ordering)
//! - Detect conflicting pools
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FeedgateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{FeedgateConfig, ProxyMode};
use crate::registry::Category;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("provider '{0}' is defined more than once")]
    DuplicateProvider(String),

    #[error("provider '{id}': {reason}")]
    InvalidProvider { id: String, reason: String },

    #[error("pool '{0}' is defined more than once")]
    DuplicatePool(String),

    #[error("pools '{first}' and '{second}' both serve category '{category}'")]
    DuplicateCategory {
        category: Category,
        first: String,
        second: String,
    },

    #[error("pool '{pool}' references unknown provider '{provider}'")]
    UnknownMember { pool: String, provider: String },

    #[error("pool '{pool}' member '{provider}' serves '{provider_category}', not '{pool_category}'")]
    CategoryMismatch {
        pool: String,
        provider: String,
        provider_category: Category,
        pool_category: Category,
    },

    #[error("pool '{pool}' lists '{provider}' more than once")]
    DuplicateMember { pool: String, provider: String },

    #[error("pool '{0}': {1}")]
    InvalidPool(String, String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("health_check.timeout_secs ({timeout}) must be below interval_secs ({interval})")]
    ProbeTimeoutTooLong { timeout: u64, interval: u64 },

    #[error("cache.stale_ttl_secs ({stale}) must not be below fresh_ttl_secs ({fresh})")]
    StaleBeforeFresh { fresh: u64, stale: u64 },

    #[error("proxy: {0}")]
    InvalidProxy(String),

    #[error("cross_validation: {0}")]
    InvalidCrossValidation(String),
}

pub fn validate_config(config: &FeedgateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "server.bind_address", &config.server.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let providers = validate_providers(config, &mut errors);
    validate_pools(config, &providers, &mut errors);

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::Zero("circuit_breaker.failure_threshold"));
    }
    if config.circuit_breaker.cooldown_secs == 0 {
        errors.push(ValidationError::Zero("circuit_breaker.cooldown_secs"));
    }
    if config.rate_limit.backoff_schedule_secs.is_empty() {
        errors.push(ValidationError::Zero("rate_limit.backoff_schedule_secs length"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("server.request_timeout_secs"));
    }

    let health = &config.health_check;
    if health.enabled {
        if health.interval_secs == 0 {
            errors.push(ValidationError::Zero("health_check.interval_secs"));
        }
        if health.timeout_secs == 0 {
            errors.push(ValidationError::Zero("health_check.timeout_secs"));
        } else if health.timeout_secs >= health.interval_secs {
            errors.push(ValidationError::ProbeTimeoutTooLong {
                timeout: health.timeout_secs,
                interval: health.interval_secs,
            });
        }
    }

    let cache = &config.cache;
    if cache.stale_ttl_secs < cache.fresh_ttl_secs {
        errors.push(ValidationError::StaleBeforeFresh {
            fresh: cache.fresh_ttl_secs,
            stale: cache.stale_ttl_secs,
        });
    }
    if cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("cache.sweep_interval_secs"));
    }

    if config.proxy.enabled {
        match &config.proxy.url {
            None => errors.push(ValidationError::InvalidProxy("enabled without a url".into())),
            Some(url) if config.proxy.mode == ProxyMode::Forward && Url::parse(url).is_err() => {
                errors.push(ValidationError::InvalidProxy(format!("invalid url '{url}'")))
            }
            Some(_) => {}
        }
    }

    let cross = &config.cross_validation;
    if cross.min_sources == 0 || cross.max_sources < cross.min_sources {
        errors.push(ValidationError::InvalidCrossValidation(format!(
            "need 0 < min_sources ({}) <= max_sources ({})",
            cross.min_sources, cross.max_sources
        )));
    }
    if !(cross.outlier_threshold > 0.0) {
        errors.push(ValidationError::InvalidCrossValidation(
            "outlier_threshold must be positive".into(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Returns provider id → category for the pool checks.
fn validate_providers<'a>(
    config: &'a FeedgateConfig,
    errors: &mut Vec<ValidationError>,
) -> HashMap<&'a str, &'a Category> {
    let mut providers = HashMap::new();

    for provider in &config.providers {
        let invalid = |reason: &str| ValidationError::InvalidProvider {
            id: provider.id.clone(),
            reason: reason.to_string(),
        };

        if provider.id.trim().is_empty() {
            errors.push(invalid("id must not be empty"));
            continue;
        }
        if providers.insert(provider.id.as_str(), &provider.category).is_some() {
            errors.push(ValidationError::DuplicateProvider(provider.id.clone()));
        }
        if provider.category.is_empty() {
            errors.push(invalid("category must not be empty"));
        }
        match Url::parse(&provider.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(invalid(&format!("unsupported scheme '{}'", url.scheme()))),
            Err(e) => errors.push(invalid(&format!("invalid base_url: {e}"))),
        }
        if provider.timeout_ms == 0 {
            errors.push(invalid("timeout_ms must be greater than zero"));
        }
        if provider.rate_limit.max_requests == 0 {
            errors.push(invalid("rate_limit.max_requests must be greater than zero"));
        }
        if provider.rate_limit.window_secs == 0 {
            errors.push(invalid("rate_limit.window_secs must be greater than zero"));
        }
        if let Some(pointer) = &provider.adapter.pointer {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                errors.push(invalid("adapter.pointer must start with '/'"));
            }
        }
        if provider.requires_auth && provider.adapter.auth_env.is_none() {
            errors.push(invalid("requires_auth needs adapter.auth_env"));
        }
    }

    providers
}

fn validate_pools(
    config: &FeedgateConfig,
    providers: &HashMap<&str, &Category>,
    errors: &mut Vec<ValidationError>,
) {
    let mut pool_ids = HashSet::new();
    let mut categories: HashMap<&Category, &str> = HashMap::new();

    for pool in &config.pools {
        if pool.id.trim().is_empty() {
            errors.push(ValidationError::InvalidPool(pool.id.clone(), "id must not be empty".into()));
        }
        if !pool_ids.insert(pool.id.as_str()) {
            errors.push(ValidationError::DuplicatePool(pool.id.clone()));
        }
        if pool.category.is_empty() {
            errors.push(ValidationError::InvalidPool(
                pool.id.clone(),
                "category must not be empty".into(),
            ));
        } else if let Some(first) = categories.insert(&pool.category, pool.id.as_str()) {
            errors.push(ValidationError::DuplicateCategory {
                category: pool.category.clone(),
                first: first.to_string(),
                second: pool.id.clone(),
            });
        }
        if let (Some(fresh), Some(stale)) = (pool.fresh_ttl_secs, pool.stale_ttl_secs) {
            if stale < fresh {
                errors.push(ValidationError::InvalidPool(
                    pool.id.clone(),
                    format!("stale_ttl_secs ({stale}) below fresh_ttl_secs ({fresh})"),
                ));
            }
        }

        let mut seen = HashSet::new();
        for member in &pool.members {
            let provider = member.provider.as_str();
            if !seen.insert(provider) {
                errors.push(ValidationError::DuplicateMember {
                    pool: pool.id.clone(),
                    provider: provider.to_string(),
                });
            }
            match providers.get(provider) {
                None => errors.push(ValidationError::UnknownMember {
                    pool: pool.id.clone(),
                    provider: provider.to_string(),
                }),
                Some(category) if **category != pool.category => {
                    errors.push(ValidationError::CategoryMismatch {
                        pool: pool.id.clone(),
                        provider: provider.to_string(),
                        provider_category: (*category).clone(),
                        pool_category: pool.category.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }
}
