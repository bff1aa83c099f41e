//! Priority rotation strategy.

use std::cmp::Reverse;

use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind};
use crate::registry::ProviderId;

/// Highest priority first. Ties go to the provider with fewer consecutive
/// failures, then the lower average latency (unknown last), then member order.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityOrder;

impl RotationStrategy for PriorityOrder {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Priority
    }

    fn order(&self, candidates: &[Candidate], _member_count: usize) -> Vec<ProviderId> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| {
            (
                Reverse(c.priority),
                c.consecutive_failures,
                c.avg_latency.is_none(),
                c.avg_latency,
                c.position,
            )
        });
        ordered.into_iter().map(|c| c.id.clone()).collect()
    }
}
