//! Mutable per-provider runtime state.

use crate::health::state::UsageStats;
use crate::resilience::circuit_breaker::CircuitStatus;
use crate::resilience::rate_limit::RateWindow;
use crate::routing::proxy::ProxyDecision;

/// Everything the engine learns about a provider while the process runs.
///
/// Each subsystem owns one field and is the only writer of it; the registry
/// serializes access through the entry's mutex.
#[derive(Debug, Clone, Default)]
pub struct ProviderRuntimeState {
    pub circuit: CircuitStatus,
    pub rate: RateWindow,
    pub proxy: ProxyDecision,
    pub usage: UsageStats,
}
