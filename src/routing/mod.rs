//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt against provider
//!     → proxy.rs (cached "needs proxy" decision?)
//!     → Route::Direct or Route::Proxy handed to the transport
//!     → Outcome feeds back: block-like failures mark, direct success clears
//! ```
//!
//! # Design Decisions
//! - Decisions are short-lived (default 5 min) so direct access is retried
//! - No global state beyond the per-provider entry

pub mod proxy;

pub use proxy::{ProxyDecision, ProxyRouter};
