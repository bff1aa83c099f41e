//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → sink.rs (attempt records and health snapshots)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Custom StatsSink implementations
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the HTTP layer's spans
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
pub mod sink;

pub use sink::{StatsEvent, StatsSink, TracingSink};
