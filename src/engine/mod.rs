//! The fetch-and-fallback engine.
//!
//! # Data Flow
//! ```text
//! FetchRequest { category, params, deadline, cache_mode }
//!     → cache (fresh hit returns immediately)
//!     → PoolManager::candidates (eligible members, strategy order)
//!     → for each candidate, sequentially, within the deadline:
//!         build request (adapter) → admission (circuit trial, rate budget)
//!         → Transport (direct, or proxy when required)
//!         → classify → record (stats, breaker, limiter, proxy router, sink)
//!         → success: write-through cache, return
//!         → proxy-trigger: one retry via proxy
//!     → exhausted: stale cache, else FetchError
//! ```
//!
//! # Design Decisions
//! - One code path records live attempts and health probes
//! - Callers never see individual attempt failures, only exhaustion
//! - Cross validation reuses the single-provider attempt path concurrently

pub mod attempt;
pub mod builder;
pub mod cross_validator;
pub mod error;
pub mod fallback;
pub mod request;

pub use attempt::{AttemptLog, AttemptRecord};
pub use builder::{BuildError, EngineBuilder};
pub use cross_validator::{CrossValidationConfig, CrossValidationError, CrossValidator, Reconciliation};
pub use error::{AttemptError, FetchError, SkipReason, SkippedCandidate};
pub use fallback::{EngineSettings, FallbackEngine, ProbeResult, ValidationReport, ValidationRequest};
pub use request::{FetchParams, FetchRequest, FetchResponse};
