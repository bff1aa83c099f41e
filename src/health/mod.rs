//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every provider concurrently (adapter probe request)
//!     → Same recording path as live attempts
//!     → Health snapshot to the stats sink and metrics
//!
//! Passive health checks (passive.rs):
//!     Attempt outcome observed (status code, transport error)
//!     → Classified into an AttemptOutcome
//!     → Feeds circuit breaker, rate limiter, proxy router
//!
//! Statistics (state.rs):
//!     Per-provider counters and EWMA latency
//!     → ProviderStats snapshots for admin and monitoring
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Probes obey circuit trial rules and consume rate budget
//! - Health state is per-provider, not per-pool

pub mod active;
pub mod passive;
pub mod state;

pub use active::HealthMonitor;
pub use passive::AttemptOutcome;
pub use state::{ProviderStats, UsageStats};
