//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FeedgateConfig (validated, immutable)
//!     → EngineBuilder::from_config builds the engine once
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; pools change only through the admin API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdapterConfig, AdminConfig, CacheConfig, CircuitBreakerSettings, CrossValidationSettings,
    EngineConfig, FeedgateConfig, HealthCheckConfig, LogFormat, ObservabilityConfig, PoolConfig,
    ProviderConfig, ProviderRateLimit, ProxyConfig, ProxyMode, RateLimitConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
