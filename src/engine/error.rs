//! Fetch errors.
//!
//! Individual attempt failures are absorbed by the fallback loop; callers
//! only ever see the errors below, and only after stale cache has been
//! tried.

use std::fmt;

use serde::Serialize;

use crate::adapter::AdapterError;
use crate::health::passive::AttemptOutcome;
use crate::load_balancer::PoolError;
use crate::registry::{Category, ProviderId};

/// The underlying failure of one provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptError {
    pub provider: ProviderId,
    pub outcome: AttemptOutcome,
    pub message: String,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.outcome, self.message)
    }
}

/// Why a candidate was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CircuitOpen,
    RateLimited,
    Backoff,
    Adapter(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    pub provider: ProviderId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("no pool serves category '{0}'")]
    CategoryNotFound(Category),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Nothing could be attempted: empty pool, or every member skipped.
    #[error("pool '{pool}' has no available provider ({} skipped)", .skipped.len())]
    PoolExhausted {
        pool: String,
        skipped: Vec<SkippedCandidate>,
    },

    #[error("all providers in pool '{pool}' failed; last error: {last_error}")]
    AllProvidersFailed {
        pool: String,
        attempts: u32,
        last_error: AttemptError,
        skipped: Vec<SkippedCandidate>,
    },
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::CategoryNotFound(_) => "category_not_found",
            FetchError::InvalidRequest(_) => "invalid_request",
            FetchError::PoolExhausted { .. } | FetchError::AllProvidersFailed { .. } => {
                "temporarily_unavailable"
            }
        }
    }

    /// Transient: the caller may retry later.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FetchError::PoolExhausted { .. } | FetchError::AllProvidersFailed { .. }
        )
    }
}

impl From<PoolError> for FetchError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::CategoryNotFound(category) => FetchError::CategoryNotFound(category),
            other => FetchError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<&AdapterError> for SkipReason {
    fn from(error: &AdapterError) -> Self {
        SkipReason::Adapter(error.to_string())
    }
}
