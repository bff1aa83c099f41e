//! Provider usage statistics.
//!
//! # Responsibilities
//! - Count requests and successes per provider
//! - Keep a rolling latency average (EWMA) fed by successful attempts
//! - Produce serializable snapshots for the admin API and stats sink
//!
//! Live attempts and health probes both land here through
//! `UsageStats::record`, so the two never diverge.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::health::passive::AttemptOutcome;
use crate::registry::descriptor::ProviderDescriptor;
use crate::registry::state::ProviderRuntimeState;
use crate::resilience::circuit_breaker::CircuitState;

/// Smoothing factor for the latency average.
pub const LATENCY_EWMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub avg_latency: Option<Duration>,
    pub last_success_at: Option<Instant>,
    pub last_failure_at: Option<Instant>,
    pub last_outcome: Option<AttemptOutcome>,
}

impl UsageStats {
    pub fn record(&mut self, outcome: AttemptOutcome, latency: Duration, now: Instant) {
        self.total_requests += 1;
        self.last_outcome = Some(outcome);

        if outcome.is_success() {
            self.successful_requests += 1;
            self.last_success_at = Some(now);
            self.avg_latency = Some(match self.avg_latency {
                None => latency,
                Some(avg) => Duration::from_secs_f64(
                    LATENCY_EWMA_ALPHA * latency.as_secs_f64()
                        + (1.0 - LATENCY_EWMA_ALPHA) * avg.as_secs_f64(),
                ),
            });
        } else {
            self.last_failure_at = Some(now);
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        if self.total_requests == 0 {
            return None;
        }
        Some(self.successful_requests as f64 / self.total_requests as f64)
    }
}

/// Point-in-time view of one provider, as exposed to operators.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub id: String,
    pub name: String,
    pub category: String,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: Option<f64>,
    pub avg_latency_ms: Option<u64>,
    pub rate_limit_hits: u64,
    pub in_backoff: bool,
    pub proxy_required: bool,
    pub last_outcome: Option<AttemptOutcome>,
    pub last_success_ms_ago: Option<u64>,
    pub last_failure_ms_ago: Option<u64>,
}

impl ProviderStats {
    pub fn capture(
        descriptor: &ProviderDescriptor,
        state: &ProviderRuntimeState,
        now: Instant,
    ) -> Self {
        let ago = |at: Option<Instant>| at.map(|at| now.saturating_duration_since(at).as_millis() as u64);

        Self {
            id: descriptor.id.to_string(),
            name: descriptor.name.clone(),
            category: descriptor.category.to_string(),
            circuit_state: state.circuit.effective_state(now),
            consecutive_failures: state.circuit.consecutive_failures,
            total_requests: state.usage.total_requests,
            successful_requests: state.usage.successful_requests,
            success_rate: state.usage.success_rate(),
            avg_latency_ms: state.usage.avg_latency.map(|d| d.as_millis() as u64),
            rate_limit_hits: state.rate.hits,
            in_backoff: state.rate.in_backoff(now),
            proxy_required: state.proxy.is_required(now),
            last_outcome: state.usage.last_outcome,
            last_success_ms_ago: ago(state.usage.last_success_at),
            last_failure_ms_ago: ago(state.usage.last_failure_at),
        }
    }

    /// Healthy means traffic would be routed to it right now.
    pub fn is_healthy(&self) -> bool {
        self.circuit_state != CircuitState::Open && !self.in_backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_latency_sample_is_taken_verbatim() {
        let mut usage = UsageStats::default();
        let now = Instant::now();

        usage.record(AttemptOutcome::Success, Duration::from_millis(200), now);
        assert_eq!(usage.avg_latency, Some(Duration::from_millis(200)));

        usage.record(AttemptOutcome::Success, Duration::from_millis(100), now);
        // 0.3 * 100 + 0.7 * 200
        let avg = usage.avg_latency.unwrap().as_millis();
        assert!((169..=171).contains(&avg), "avg was {avg}");
    }

    #[test]
    fn failures_do_not_move_latency() {
        let mut usage = UsageStats::default();
        let now = Instant::now();

        usage.record(AttemptOutcome::Success, Duration::from_millis(50), now);
        usage.record(AttemptOutcome::Timeout, Duration::from_secs(5), now);

        assert_eq!(usage.avg_latency, Some(Duration::from_millis(50)));
        assert_eq!(usage.total_requests, 2);
        assert_eq!(usage.success_rate(), Some(0.5));
        assert!(usage.last_failure_at.is_some());
    }
}
