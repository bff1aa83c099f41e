//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (fetches, attempts, breaker state, cache)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track per-provider and aggregate metrics
//!
//! # Metrics
//! - `feedgate_fetch_total` (counter): fetches by category, result
//! - `feedgate_fetch_duration_seconds` (histogram): end-to-end fetch latency
//! - `feedgate_attempts_total` (counter): provider attempts by provider, outcome
//! - `feedgate_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `feedgate_rate_limit_hits_total` (counter): budget denials and 429s
//! - `feedgate_cache_events_total` (counter): hit, stale_hit, miss, evicted
//! - `feedgate_cache_entries` (gauge): live cache entries
//! - `feedgate_provider_healthy` (gauge): 1=healthy, 0=unhealthy
//!
//! Without an installed recorder every call here is a no-op, which is what
//! the tests rely on.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fetch(category: &str, result: &'static str, elapsed: Duration) {
    metrics::counter!(
        "feedgate_fetch_total",
        "category" => category.to_string(),
        "result" => result
    )
    .increment(1);
    metrics::histogram!("feedgate_fetch_duration_seconds", "category" => category.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_attempt(provider: &str, outcome: &'static str, used_proxy: bool) {
    metrics::counter!(
        "feedgate_attempts_total",
        "provider" => provider.to_string(),
        "outcome" => outcome,
        "proxy" => if used_proxy { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_circuit_state(provider: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("feedgate_circuit_state", "provider" => provider.to_string()).set(value);
}

pub fn record_rate_limit_hit(provider: &str) {
    metrics::counter!("feedgate_rate_limit_hits_total", "provider" => provider.to_string())
        .increment(1);
}

pub fn record_cache_event(event: &'static str) {
    metrics::counter!("feedgate_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("feedgate_cache_entries").set(entries as f64);
}

pub fn record_provider_health(provider: &str, healthy: bool) {
    metrics::gauge!("feedgate_provider_healthy", "provider" => provider.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
