//! feedgate: resilient multi-provider fetch-and-fallback engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ engine::FallbackEngine ──▶ cache (fresh hit)
//!                                        │
//!                                        ▼
//!                          load_balancer (pool per category,
//!                          rotation strategy over eligible members)
//!                                        │
//!                                        ▼
//!                  resilience (circuit breaker, rate limiter, deadline)
//!                                        │
//!                                        ▼
//!                  adapter ──▶ http::client (direct / proxy via routing)
//!                                        │
//!                                        ▼
//!                              Third-party data providers
//!
//!     Cross-cutting: config, registry (runtime state), health (probes,
//!     stats), observability (logs, metrics, stats sink), lifecycle, admin
//! ```

// Core subsystems
pub mod adapter;
pub mod cache;
pub mod config;
pub mod engine;
pub mod http;
pub mod registry;
pub mod routing;

// Provider management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::FeedgateConfig;
pub use engine::{EngineBuilder, FallbackEngine, FetchError, FetchRequest, FetchResponse};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
