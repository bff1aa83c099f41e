//! Backoff schedules.
//!
//! Two kinds of waiting live here: the stepped 429 schedule applied by the
//! rate limiter, and the exponential cooldown applied by the circuit breaker
//! when a half-open trial fails.

use std::time::Duration;

/// Default 429 schedule: 2 min, 4 min, then the 10 min blacklist window.
pub const DEFAULT_RATE_LIMIT_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(120),
    Duration::from_secs(240),
    Duration::from_secs(600),
];

/// Stepped backoff applied after consecutive 429 responses.
///
/// The last step is the blacklist window and repeats for every further hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitBackoff {
    steps: Vec<Duration>,
}

impl RateLimitBackoff {
    /// Build from a schedule. An empty schedule falls back to the default.
    pub fn new(steps: Vec<Duration>) -> Self {
        if steps.is_empty() {
            return Self::default();
        }
        Self { steps }
    }

    pub fn from_secs(steps: &[u64]) -> Self {
        Self::new(steps.iter().copied().map(Duration::from_secs).collect())
    }

    /// Backoff for the `consecutive`-th 429 in a row (1-based).
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        let idx = (consecutive.max(1) as usize - 1).min(self.steps.len() - 1);
        self.steps[idx]
    }

    /// True once the schedule has reached its final step.
    pub fn is_blacklisted(&self, consecutive: u32) -> bool {
        consecutive as usize >= self.steps.len()
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            steps: DEFAULT_RATE_LIMIT_SCHEDULE.to_vec(),
        }
    }
}

/// Cooldown after the `reopen_count`-th consecutive re-open: doubles each
/// time, capped at `max`.
pub fn escalating_cooldown(base: Duration, reopen_count: u32, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(reopen_count.min(16));
    base.saturating_mul(factor).min(max.max(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_schedule_escalates_then_repeats() {
        let backoff = RateLimitBackoff::default();

        assert_eq!(backoff.delay_for(1), Duration::from_secs(120));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(240));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(600));
        assert_eq!(backoff.delay_for(7), Duration::from_secs(600));
        assert!(!backoff.is_blacklisted(2));
        assert!(backoff.is_blacklisted(3));
    }

    #[test]
    fn empty_schedule_uses_default() {
        assert_eq!(RateLimitBackoff::new(Vec::new()), RateLimitBackoff::default());
    }

    #[test]
    fn cooldown_doubles_up_to_cap() {
        let base = Duration::from_secs(60);
        let max = Duration::from_secs(600);

        assert_eq!(escalating_cooldown(base, 0, max), Duration::from_secs(60));
        assert_eq!(escalating_cooldown(base, 1, max), Duration::from_secs(120));
        assert_eq!(escalating_cooldown(base, 3, max), Duration::from_secs(480));
        assert_eq!(escalating_cooldown(base, 4, max), max);
        assert_eq!(escalating_cooldown(base, 40, max), max);
    }
}
