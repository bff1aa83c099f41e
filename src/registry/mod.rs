//! Provider registry subsystem.
//!
//! # Data Flow
//! ```text
//! Config [[providers]] → descriptor.rs (immutable ProviderDescriptor)
//!     → registry.rs (ProviderEntry: descriptor + adapter + runtime state)
//!     → Read by pools, breaker, rate limiter, proxy router, health monitor
//! ```
//!
//! # Design Decisions
//! - Descriptors never change after startup
//! - Runtime state sits behind one mutex per provider; there is no global lock
//! - Entries are shared as `Arc` so in-flight attempts outlive admin changes

pub mod descriptor;
pub mod registry;
pub mod state;

pub use descriptor::{Category, ProviderDescriptor, ProviderId, RateLimit};
pub use registry::{ProviderEntry, ProviderRegistry, RegistryError};
pub use state::ProviderRuntimeState;
