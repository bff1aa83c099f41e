//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate provider:
//!     → circuit_breaker.rs (skip if Open, single trial if Half-Open)
//!     → rate_limit.rs (skip if budget spent or in 429 backoff)
//!     → timeouts.rs (attempt timeout = min(provider timeout, remaining deadline))
//!     → Outcome recorded back into breaker and limiter
//! ```
//!
//! # Design Decisions
//! - Every external call has a timeout; nothing waits unbounded
//! - State lives in the provider registry, these types only interpret it
//! - 429s escalate backoff (backoff.rs) but never open the circuit

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateDenial, RateLimiter};
pub use timeouts::{AttemptBudget, Deadline};
