//! Fetch request and response types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheMode;
use crate::registry::{Category, ProviderId};
use crate::resilience::Deadline;

/// Query parameters of a fetch, normalized: keys and values trimmed,
/// empty keys dropped, iteration in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FetchParams(BTreeMap<String, String>);

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value);
        }
        params
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        let key = key.as_ref().trim();
        if key.is_empty() {
            return;
        }
        self.0.insert(key.to_string(), value.as_ref().trim().to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub category: Category,
    pub params: FetchParams,
    pub deadline: Option<Deadline>,
    pub cache_mode: CacheMode,
}

impl FetchRequest {
    pub fn new(category: impl Into<Category>) -> Self {
        Self {
            category: category.into(),
            params: FetchParams::default(),
            deadline: None,
            cache_mode: CacheMode::Use,
        }
    }

    pub fn param(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn with_params(mut self, params: FetchParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn within(self, budget: Duration) -> Self {
        self.with_deadline(Deadline::after(budget))
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }
}

/// Successful fetch result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResponse {
    pub payload: Value,
    pub provider: ProviderId,
    pub used_proxy: bool,
    /// Served from cache past its freshness window because every live
    /// candidate failed.
    pub stale: bool,
    pub from_cache: bool,
    /// Provider attempts made for this fetch.
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// Age of the cached entry, when served from cache.
    #[serde(rename = "age_ms", serialize_with = "opt_as_millis", skip_serializing_if = "Option::is_none")]
    pub age: Option<Duration>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn opt_as_millis<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_u64(d.as_millis() as u64),
        None => s.serialize_none(),
    }
}
