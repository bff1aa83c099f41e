//! Provider descriptors.
//!
//! A descriptor is the immutable description of one third-party source:
//! where it lives, how hard it may be driven and how it ranks against its
//! peers. Descriptors are built once at startup and never mutated.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Unique provider identifier (e.g. `coingecko`, `binance`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Data category served by a pool (e.g. `market_price`, `ohlcv`, `news`).
///
/// Names are trimmed and lowercased so `Market_Price` and `market_price`
/// address the same pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Category(String);

impl Category {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared request budget: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub const fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Immutable configuration for a single provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: String,
    pub category: Category,
    pub base_url: Url,
    pub requires_auth: bool,
    pub supports_proxy: bool,
    pub rate_limit: RateLimit,
    /// Higher is preferred.
    pub priority: i32,
    /// Relative share for weighted random rotation.
    pub weight: u32,
    pub timeout: Duration,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, category: impl Into<Category>, base_url: Url) -> Self {
        let id = ProviderId::new(id);
        Self {
            name: id.as_str().to_string(),
            id,
            category: category.into(),
            base_url,
            requires_auth: false,
            supports_proxy: false,
            rate_limit: RateLimit::default(),
            priority: 0,
            weight: 1,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_proxy_support(mut self, supports_proxy: bool) -> Self {
        self.supports_proxy = supports_proxy;
        self
    }

    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_are_normalized() {
        assert_eq!(Category::new("  Market_Price "), Category::new("market_price"));
        assert_eq!(Category::from("OHLCV").as_str(), "ohlcv");
    }

    #[test]
    fn descriptor_defaults() {
        let descriptor = ProviderDescriptor::new(
            "coingecko",
            "market_price",
            Url::parse("https://api.coingecko.com/api/v3/").unwrap(),
        );

        assert_eq!(descriptor.name, "coingecko");
        assert_eq!(descriptor.weight, 1);
        assert_eq!(descriptor.rate_limit, RateLimit::per_minute(60));
        assert!(!descriptor.supports_proxy);
    }
}
