//! Weighted random rotation strategy.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind};
use crate::registry::ProviderId;

/// Repeated weighted draws without replacement. A member's chance to lead
/// is proportional to its weight; zero-weight members always trail, in
/// member order.
#[derive(Debug)]
pub struct WeightedRandom {
    rng: Mutex<StdRng>,
}

impl WeightedRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for WeightedRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for WeightedRandom {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WeightedRandom
    }

    fn order(&self, candidates: &[Candidate], _member_count: usize) -> Vec<ProviderId> {
        let (mut weighted, mut zero): (Vec<&Candidate>, Vec<&Candidate>) =
            candidates.iter().partition(|c| c.weight > 0);
        zero.sort_by_key(|c| c.position);

        let mut ordered = Vec::with_capacity(candidates.len());
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        while !weighted.is_empty() {
            let total: u64 = weighted.iter().map(|c| u64::from(c.weight)).sum();
            let mut roll = rng.gen_range(0..total);
            let mut picked = weighted.len() - 1;
            for (idx, c) in weighted.iter().enumerate() {
                let weight = u64::from(c.weight);
                if roll < weight {
                    picked = idx;
                    break;
                }
                roll -= weight;
            }
            ordered.push(weighted.remove(picked).id.clone());
        }

        ordered.extend(zero.into_iter().map(|c| c.id.clone()));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::candidate;
    use std::collections::HashMap;

    fn weighted(id: &str, position: usize, weight: u32) -> Candidate {
        let mut c = candidate(id, position);
        c.weight = weight;
        c
    }

    #[test]
    fn lead_frequency_converges_to_weights() {
        let lb = WeightedRandom::seeded(7);
        let candidates = vec![weighted("a", 0, 1), weighted("b", 1, 2), weighted("c", 2, 7)];

        let draws = 10_000;
        let mut leads: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            let order = lb.order(&candidates, 3);
            assert_eq!(order.len(), 3);
            *leads.entry(order[0].to_string()).or_default() += 1;
        }

        for (id, expected) in [("a", 0.1), ("b", 0.2), ("c", 0.7)] {
            let observed = leads[id] as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "{id}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn zero_weight_members_trail_in_member_order() {
        let lb = WeightedRandom::seeded(1);
        let candidates = vec![
            weighted("z2", 0, 0),
            weighted("a", 1, 5),
            weighted("z1", 2, 0),
        ];

        for _ in 0..20 {
            let order: Vec<_> = lb.order(&candidates, 3).into_iter().map(|id| id.to_string()).collect();
            assert_eq!(order, vec!["a", "z2", "z1"]);
        }
    }
}
