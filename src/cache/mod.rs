//! Response caching.
//!
//! # Data Flow
//! ```text
//! Fetch (CacheMode::Use) → key.rs (category + normalized params)
//!     → store.rs get_fresh → hit: answer without touching providers
//! Successful attempt → store.rs put (fresh_ttl, stale_ttl)
//! All providers failed → store.rs get → stale hit flagged to the caller
//! Sweeper task → purge_expired on an interval
//! ```
//!
//! # Design Decisions
//! - Staleness is computed at read time, never stored
//! - Entries past their stale horizon are evicted lazily and by the sweeper
//! - Sharded map (`DashMap`), no global lock

use serde::{Deserialize, Serialize};

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheHit, ResponseCache};

/// How a fetch interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve a fresh entry if present; otherwise fetch and write through.
    #[default]
    Use,
    /// Always fetch, then write through. Stale fallback still allowed.
    Refresh,
    /// Always fetch; never read or write the cache.
    Bypass,
}

impl CacheMode {
    pub fn reads_fresh(&self) -> bool {
        matches!(self, CacheMode::Use)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CacheMode::Bypass)
    }

    pub fn allows_stale(&self) -> bool {
        !matches!(self, CacheMode::Bypass)
    }
}

impl std::str::FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "use" | "" => Ok(CacheMode::Use),
            "refresh" => Ok(CacheMode::Refresh),
            "bypass" => Ok(CacheMode::Bypass),
            other => Err(format!("unknown cache mode '{other}'")),
        }
    }
}
