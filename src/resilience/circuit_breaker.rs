//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: provider assumed down, attempts are skipped
//! - Half-Open: exactly one trial attempt may test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: once open_until has passed
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (cooldown doubles, capped)
//! ```
//!
//! # Design Decisions
//! - Per-provider breaker state lives in the registry entry
//! - `record_outcome` is the only writer of circuit state
//! - 429s are neutral: the rate limiter handles them

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::health::passive::AttemptOutcome;
use crate::observability::metrics;
use crate::registry::{ProviderId, ProviderRegistry};
use crate::resilience::backoff::escalating_cooldown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(600),
        }
    }
}

/// Per-provider breaker state.
#[derive(Debug, Clone, Default)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
    /// Consecutive Half-Open → Open transitions since the last close.
    pub reopen_count: u32,
    pub trial_in_flight: bool,
}

impl CircuitStatus {
    /// Move Open → Half-Open once the cooldown has elapsed.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if self.state == CircuitState::Open && self.open_until.is_some_and(|until| now >= until) {
            self.state = CircuitState::HalfOpen;
            self.open_until = None;
            self.trial_in_flight = false;
            return true;
        }
        false
    }

    /// State as it would read after `refresh`, without mutating.
    pub fn effective_state(&self, now: Instant) -> CircuitState {
        match self.state {
            CircuitState::Open if self.open_until.is_some_and(|until| now >= until) => {
                CircuitState::HalfOpen
            }
            state => state,
        }
    }

    pub fn is_available(&mut self, now: Instant) -> bool {
        self.refresh(now);
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.trial_in_flight,
            CircuitState::Open => false,
        }
    }

    /// Admit an attempt, reserving the trial slot when Half-Open.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.is_available(now) {
            return false;
        }
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = true;
        }
        true
    }

    pub fn release_trial(&mut self) {
        self.trial_in_flight = false;
    }

    /// Apply an attempt outcome. Returns the new state when it changed.
    pub fn apply(
        &mut self,
        outcome: AttemptOutcome,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<CircuitState> {
        self.refresh(now);
        let before = self.state;

        if outcome.is_success() {
            self.consecutive_failures = 0;
            if self.state == CircuitState::HalfOpen {
                self.close();
            }
        } else if outcome.counts_as_failure() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            match self.state {
                CircuitState::Closed if self.consecutive_failures >= config.failure_threshold => {
                    self.open(config.cooldown, now);
                }
                CircuitState::HalfOpen => {
                    self.reopen_count = self.reopen_count.saturating_add(1);
                    let cooldown =
                        escalating_cooldown(config.cooldown, self.reopen_count, config.max_cooldown);
                    self.open(cooldown, now);
                }
                _ => {}
            }
        } else {
            // Rate limited: the trial proved nothing either way.
            self.trial_in_flight = false;
        }

        (self.state != before).then_some(self.state)
    }

    fn open(&mut self, cooldown: Duration, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + cooldown);
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.open_until = None;
        self.reopen_count = 0;
        self.trial_in_flight = false;
    }
}

/// Registry-backed circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    registry: Arc<ProviderRegistry>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self, id: &ProviderId) -> CircuitState {
        self.registry
            .get(id)
            .map(|entry| entry.with_state(|s| s.circuit.effective_state(Instant::now())))
            .unwrap_or_default()
    }

    /// Peek: true when an attempt would be admitted right now.
    pub fn is_available(&self, id: &ProviderId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };
        entry.with_state(|s| s.circuit.is_available(Instant::now()))
    }

    /// Admit an attempt; reserves the single Half-Open trial.
    pub fn try_acquire(&self, id: &ProviderId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };
        entry.with_state(|s| s.circuit.try_acquire(Instant::now()))
    }

    /// Give back a trial whose attempt was abandoned by the caller.
    pub fn release_trial(&self, id: &ProviderId) {
        if let Some(entry) = self.registry.get(id) {
            entry.with_state(|s| s.circuit.release_trial());
        }
    }

    pub fn record_outcome(&self, id: &ProviderId, outcome: AttemptOutcome) -> CircuitState {
        let Some(entry) = self.registry.get(id) else {
            return CircuitState::Closed;
        };

        let (changed, state, failures, open_until) = entry.with_state(|s| {
            let changed = s.circuit.apply(outcome, &self.config, Instant::now());
            (
                changed,
                s.circuit.state,
                s.circuit.consecutive_failures,
                s.circuit.open_until,
            )
        });

        if let Some(state) = changed {
            match state {
                CircuitState::Open => tracing::warn!(
                    provider = %id,
                    consecutive_failures = failures,
                    cooldown_secs = open_until
                        .map(|until| until.saturating_duration_since(Instant::now()).as_secs())
                        .unwrap_or_default(),
                    "Circuit opened"
                ),
                _ => tracing::info!(provider = %id, state = state.as_str(), "Circuit state changed"),
            }
            metrics::record_circuit_state(id.as_str(), state);
        }

        state
    }
}
