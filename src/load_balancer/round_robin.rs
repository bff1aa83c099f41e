//! Round-robin rotation strategy.

use std::sync::{Mutex, PoisonError};

use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind};
use crate::registry::ProviderId;

/// Round-robin selector.
/// Stores a cursor into the member list; the next fetch starts at the first
/// eligible member at or after it and the cursor moves just past that member,
/// so members skipped as ineligible do not lose their turn.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RotationStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn order(&self, candidates: &[Candidate], member_count: usize) -> Vec<ProviderId> {
        if candidates.is_empty() || member_count == 0 {
            return Vec::new();
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let start = *cursor % member_count;

        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| (c.position + member_count - start) % member_count);

        *cursor = (ordered[0].position + 1) % member_count;
        ordered.into_iter().map(|c| c.id.clone()).collect()
    }

    fn advance(&self, member_count: usize) -> Option<usize> {
        if member_count == 0 {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        *cursor = (*cursor + 1) % member_count;
        Some(*cursor)
    }
}
