//! Fastest-response rotation strategy.

use std::time::Duration;

use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind};
use crate::registry::ProviderId;

pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(2000);

/// Known-fast providers by ascending latency, then providers with no samples
/// yet (member order), then known-slow providers by ascending latency.
///
/// Unknown providers rank above slow ones so they get sampled.
#[derive(Debug, Clone, Copy)]
pub struct FastestResponse {
    slow_threshold: Duration,
}

impl FastestResponse {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }
}

impl Default for FastestResponse {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_THRESHOLD)
    }
}

impl RotationStrategy for FastestResponse {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FastestResponse
    }

    fn order(&self, candidates: &[Candidate], _member_count: usize) -> Vec<ProviderId> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| match c.avg_latency {
            Some(latency) if latency <= self.slow_threshold => (0, latency, c.position),
            None => (1, Duration::ZERO, c.position),
            Some(latency) => (2, latency, c.position),
        });
        ordered.into_iter().map(|c| c.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::candidate;

    #[test]
    fn fast_then_unknown_then_slow() {
        let mut slow = candidate("slow", 0);
        slow.avg_latency = Some(Duration::from_millis(3500));
        let unknown = candidate("unknown", 1);
        let mut fast = candidate("fast", 2);
        fast.avg_latency = Some(Duration::from_millis(300));
        let mut faster = candidate("faster", 3);
        faster.avg_latency = Some(Duration::from_millis(90));

        let order: Vec<_> = FastestResponse::default()
            .order(&[slow, unknown, fast, faster], 4)
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(order, vec!["faster", "fast", "unknown", "slow"]);
    }
}
