//! Stats sink.
//!
//! The engine reports every attempt record and every health snapshot to a
//! `StatsSink`. The default sink writes them as structured log events;
//! embedders can install their own to forward stats elsewhere.

use crate::engine::attempt::AttemptRecord;
use crate::health::state::ProviderStats;

#[derive(Debug, Clone, Copy)]
pub enum StatsEvent<'a> {
    Attempt(&'a AttemptRecord),
    Health(&'a ProviderStats),
}

pub trait StatsSink: Send + Sync {
    fn record(&self, event: &StatsEvent<'_>);
}

/// Emits stats as `tracing` events under the `feedgate::stats` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatsSink for TracingSink {
    fn record(&self, event: &StatsEvent<'_>) {
        match event {
            StatsEvent::Attempt(record) => tracing::debug!(
                target: "feedgate::stats",
                provider = %record.provider,
                endpoint = %record.endpoint,
                outcome = record.outcome.as_str(),
                used_proxy = record.used_proxy,
                duration_ms = record.duration_ms,
                "attempt"
            ),
            StatsEvent::Health(stats) => tracing::debug!(
                target: "feedgate::stats",
                provider = %stats.id,
                circuit = stats.circuit_state.as_str(),
                healthy = stats.is_healthy(),
                success_rate = ?stats.success_rate,
                avg_latency_ms = ?stats.avg_latency_ms,
                "health"
            ),
        }
    }
}
