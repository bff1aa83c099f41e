//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build engine → Spawn background tasks
//!     → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → listeners drain, health monitor and
//!     cache sweeper exit → wait for tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then engine, then listeners
//! - One broadcast channel reaches every long-running task
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
