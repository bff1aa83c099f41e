//! Provider pools and rotation strategies.
//!
//! # Data Flow
//! ```text
//! Fetch for a category → pool.rs (PoolManager: category → Pool)
//!     → Filter members through the caller's eligibility check
//!       (circuit available, rate budget left)
//!     → Apply the pool's rotation strategy:
//!         - round_robin.rs (mutex cursor, skips don't consume a turn)
//!         - priority.rs (priority, then health, then latency)
//!         - weighted_random.rs (weighted draws without replacement)
//!         - least_used.rs (fewest total requests)
//!         - fastest.rs (fast, unknown, slow)
//!     → Ordered candidate list, head recorded in rotation history
//! ```
//!
//! # Design Decisions
//! - Strategy selection per pool, one pool per category
//! - Membership is copy-on-write (`ArcSwap`); selection never blocks admin
//! - Ineligible providers are excluded before the strategy runs

use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::ProviderId;

pub mod fastest;
pub mod least_used;
pub mod pool;
pub mod priority;
pub mod round_robin;
pub mod weighted_random;

pub use pool::{Pool, PoolDefaults, PoolError, PoolManager, PoolMember, PoolSnapshot, RotationEvent};

/// Everything a strategy may look at when ordering one member.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: ProviderId,
    /// Index in the pool's member list.
    pub position: usize,
    pub priority: i32,
    pub weight: u32,
    pub consecutive_failures: u32,
    pub avg_latency: Option<Duration>,
    pub total_requests: u64,
}

/// Orders eligible pool members, best first.
pub trait RotationStrategy: Send + Sync + Debug {
    fn kind(&self) -> StrategyKind;

    /// Order `candidates` (already filtered for eligibility). May advance
    /// internal state such as a cursor or RNG.
    fn order(&self, candidates: &[Candidate], member_count: usize) -> Vec<ProviderId>;

    /// Manual rotation. Returns the member position now leading, if the
    /// strategy has a notion of one.
    fn advance(&self, _member_count: usize) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RoundRobin,
    #[default]
    Priority,
    WeightedRandom,
    LeastUsed,
    FastestResponse,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::Priority => "priority",
            StrategyKind::WeightedRandom => "weighted_random",
            StrategyKind::LeastUsed => "least_used",
            StrategyKind::FastestResponse => "fastest_response",
        }
    }

    pub fn build(self, options: &StrategyOptions) -> Box<dyn RotationStrategy> {
        match self {
            StrategyKind::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            StrategyKind::Priority => Box::new(priority::PriorityOrder),
            StrategyKind::WeightedRandom => Box::new(match options.seed {
                Some(seed) => weighted_random::WeightedRandom::seeded(seed),
                None => weighted_random::WeightedRandom::new(),
            }),
            StrategyKind::LeastUsed => Box::new(least_used::LeastUsed),
            StrategyKind::FastestResponse => {
                Box::new(fastest::FastestResponse::new(options.slow_latency_threshold))
            }
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pool knobs that some strategies need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyOptions {
    pub seed: Option<u64>,
    pub slow_latency_threshold: Duration,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            seed: None,
            slow_latency_threshold: fastest::DEFAULT_SLOW_THRESHOLD,
        }
    }
}

#[cfg(test)]
pub(crate) fn candidate(id: &str, position: usize) -> Candidate {
    Candidate {
        id: ProviderId::from(id),
        position,
        priority: 0,
        weight: 1,
        consecutive_failures: 0,
        avg_latency: None,
        total_requests: 0,
    }
}
