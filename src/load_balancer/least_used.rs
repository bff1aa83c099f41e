//! Least-used rotation strategy.

use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind};
use crate::registry::ProviderId;

/// Least-used selector.
/// Orders by total requests ascending; ties keep member order (stable sort).
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastUsed;

impl RotationStrategy for LeastUsed {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastUsed
    }

    fn order(&self, candidates: &[Candidate], _member_count: usize) -> Vec<ProviderId> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.total_requests);
        ordered.into_iter().map(|c| c.id.clone()).collect()
    }
}
