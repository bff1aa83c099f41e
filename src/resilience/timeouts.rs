//! Timeout enforcement.
//!
//! # Responsibilities
//! - Track the caller's overall deadline for a fetch
//! - Derive each attempt's timeout as `min(provider timeout, remaining)`
//! - Tell the engine which of the two was binding
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests drive expiry
//! - An attempt cut short by the caller's deadline is not the provider's fault

use std::time::Duration;

use tokio::time::Instant;

/// Overall deadline for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn after(budget: Duration) -> Self {
        Self::at(Instant::now() + budget)
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Timeout for an attempt against a provider with `provider_timeout`.
    pub fn budget_for(&self, provider_timeout: Duration) -> AttemptBudget {
        let remaining = self.remaining();
        if remaining < provider_timeout {
            AttemptBudget {
                timeout: remaining,
                bound_by_deadline: true,
            }
        } else {
            AttemptBudget {
                timeout: provider_timeout,
                bound_by_deadline: false,
            }
        }
    }
}

/// Effective timeout for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    pub timeout: Duration,
    /// The caller's deadline, not the provider's own timeout, is the limit.
    pub bound_by_deadline: bool,
}

impl AttemptBudget {
    pub fn unbounded(provider_timeout: Duration) -> Self {
        Self {
            timeout: provider_timeout,
            bound_by_deadline: false,
        }
    }

    pub fn for_deadline(deadline: Option<&Deadline>, provider_timeout: Duration) -> Self {
        match deadline {
            Some(deadline) => deadline.budget_for(provider_timeout),
            None => Self::unbounded(provider_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn budget_is_min_of_provider_timeout_and_remaining() {
        let deadline = Deadline::after(Duration::from_secs(3));

        let budget = deadline.budget_for(Duration::from_secs(5));
        assert_eq!(budget.timeout, Duration::from_secs(3));
        assert!(budget.bound_by_deadline);

        let budget = deadline.budget_for(Duration::from_secs(1));
        assert_eq!(budget.timeout, Duration::from_secs(1));
        assert!(!budget.bound_by_deadline);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
