//! The fallback engine.
//!
//! # Responsibilities
//! - Answer `fetch` from cache or from the first provider that succeeds
//! - Walk pool candidates sequentially within the caller's deadline
//! - Record every attempt into stats, breaker, rate limiter, proxy router
//! - Fall back to stale cache, then to a typed error
//!
//! # Design Decisions
//! - One attempt at a time per fetch; only cross validation fans out
//! - Admission (circuit trial, rate budget) is taken right before sending
//! - An attempt cut short by the caller's deadline is not held against the
//!   provider

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{self, Instant};

use crate::adapter::AdapterError;
use crate::cache::{CacheKey, ResponseCache};
use crate::engine::attempt::{AttemptLog, AttemptRecord};
use crate::engine::cross_validator::{
    CrossValidationError, CrossValidator, Reconciliation, SourceSample,
};
use crate::engine::error::{AttemptError, FetchError, SkipReason, SkippedCandidate};
use crate::engine::request::{FetchParams, FetchRequest, FetchResponse};
use crate::health::passive::{classify_status, classify_transport, AttemptOutcome};
use crate::health::state::ProviderStats;
use crate::http::client::{HttpRequest, HttpResponse, Route, Transport};
use crate::load_balancer::{PoolError, PoolManager, PoolSnapshot, RotationEvent};
use crate::observability::{metrics, StatsEvent, StatsSink};
use crate::registry::{Category, ProviderEntry, ProviderId, ProviderRegistry};
use crate::resilience::{
    AttemptBudget, CircuitBreaker, CircuitState, Deadline, RateDenial, RateLimiter,
};
use crate::routing::ProxyRouter;

/// Engine-wide knobs that are not owned by a subsystem.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Deadline applied when the caller gives none.
    pub default_deadline: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_deadline: Some(Duration::from_secs(30)),
        }
    }
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Completed(AttemptOutcome),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub category: Category,
    pub params: FetchParams,
    /// JSON pointer into each provider's payload; empty for the payload itself.
    pub pointer: String,
    pub deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub category: Category,
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
    pub failures: Vec<AttemptError>,
    pub skipped: Vec<SkippedCandidate>,
}

/// Failure of one transport round trip, before recording.
#[derive(Debug)]
struct AttemptFailure {
    outcome: AttemptOutcome,
    message: String,
}

impl AttemptFailure {
    fn new(outcome: AttemptOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// What one candidate produced, including its optional proxy retry.
enum ProviderAttempt {
    Success { payload: Value, used_proxy: bool, made: u32 },
    Failed { error: AttemptError, made: u32 },
    /// The caller's deadline ran out mid-attempt.
    DeadlineExpired { error: AttemptError, made: u32 },
}

pub struct FallbackEngine {
    pub(crate) settings: EngineSettings,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) pools: PoolManager,
    pub(crate) circuit: CircuitBreaker,
    pub(crate) limiter: RateLimiter,
    pub(crate) proxy: ProxyRouter,
    pub(crate) cache: ResponseCache,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) attempts: AttemptLog,
    pub(crate) sink: Arc<dyn StatsSink>,
    pub(crate) validator: CrossValidator,
}

impl std::fmt::Debug for FallbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEngine")
            .field("settings", &self.settings)
            .field("providers", &self.registry.len())
            .field("pools", &self.pools)
            .field("cache_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl FallbackEngine {
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let result = self.fetch_inner(&request, started).await;

        let label = match &result {
            Ok(response) if response.stale => "stale",
            Ok(response) if response.from_cache => "cache",
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::record_fetch(request.category.as_str(), label, started.elapsed());
        result
    }

    async fn fetch_inner(
        &self,
        request: &FetchRequest,
        started: Instant,
    ) -> Result<FetchResponse, FetchError> {
        if request.category.is_empty() {
            return Err(FetchError::InvalidRequest("category must not be empty".into()));
        }

        let key = CacheKey::new(&request.category, &request.params);
        let deadline = request
            .deadline
            .or_else(|| self.settings.default_deadline.map(Deadline::after));

        if request.cache_mode.reads_fresh() {
            if let Some(hit) = self.cache.get_fresh(&key) {
                tracing::debug!(category = %request.category, provider = %hit.provider, "Served from cache");
                return Ok(FetchResponse {
                    payload: hit.payload,
                    provider: hit.provider,
                    used_proxy: false,
                    stale: false,
                    from_cache: true,
                    attempts: 0,
                    elapsed: started.elapsed(),
                    age: Some(hit.age),
                });
            }
        }

        let mut skipped = Vec::new();
        let (pool, candidates) = self.pools.candidates(&request.category, |entry| {
            match self.eligibility(entry.id()) {
                Ok(()) => true,
                Err(reason) => {
                    skipped.push(SkippedCandidate {
                        provider: entry.id().clone(),
                        reason,
                    });
                    false
                }
            }
        })?;

        let mut made = 0u32;
        let mut last_error: Option<AttemptError> = None;

        for entry in candidates {
            if deadline.is_some_and(|d| d.is_expired()) {
                tracing::debug!(category = %request.category, "Deadline reached before next candidate");
                break;
            }

            let http_request = match self.prepare(&entry, &request.params) {
                Ok(http_request) => http_request,
                Err(reason) => {
                    skipped.push(SkippedCandidate {
                        provider: entry.id().clone(),
                        reason,
                    });
                    continue;
                }
            };

            match self.attempt_provider(&entry, http_request, deadline.as_ref()).await {
                ProviderAttempt::Success {
                    payload,
                    used_proxy,
                    made: n,
                } => {
                    made += n;
                    if request.cache_mode.writes() {
                        self.cache.put(
                            key,
                            payload.clone(),
                            entry.id().clone(),
                            pool.fresh_ttl(),
                            pool.stale_ttl(),
                        );
                    }
                    return Ok(FetchResponse {
                        payload,
                        provider: entry.id().clone(),
                        used_proxy,
                        stale: false,
                        from_cache: false,
                        attempts: made,
                        elapsed: started.elapsed(),
                        age: None,
                    });
                }
                ProviderAttempt::Failed { error, made: n } => {
                    made += n;
                    last_error = Some(error);
                }
                ProviderAttempt::DeadlineExpired { error, made: n } => {
                    made += n;
                    last_error = Some(error);
                    break;
                }
            }
        }

        if request.cache_mode.allows_stale() {
            if let Some(hit) = self.cache.get(&key) {
                tracing::warn!(
                    category = %request.category,
                    provider = %hit.provider,
                    age_secs = hit.age.as_secs(),
                    attempts = made,
                    "All providers unavailable, serving cached data"
                );
                return Ok(FetchResponse {
                    payload: hit.payload,
                    provider: hit.provider,
                    used_proxy: false,
                    stale: hit.is_stale,
                    from_cache: true,
                    attempts: made,
                    elapsed: started.elapsed(),
                    age: Some(hit.age),
                });
            }
        }

        let error = match last_error {
            Some(last_error) => FetchError::AllProvidersFailed {
                pool: pool.id().to_string(),
                attempts: made,
                last_error,
                skipped,
            },
            None => FetchError::PoolExhausted {
                pool: pool.id().to_string(),
                skipped,
            },
        };
        tracing::warn!(category = %request.category, error = %error, "Fetch failed");
        Err(error)
    }

    /// Peek-only eligibility used while ordering candidates.
    fn eligibility(&self, id: &ProviderId) -> Result<(), SkipReason> {
        if !self.circuit.is_available(id) {
            return Err(SkipReason::CircuitOpen);
        }
        self.limiter.check(id).map_err(skip_reason)
    }

    /// Build the request and take admission (circuit trial, rate budget).
    fn prepare(&self, entry: &ProviderEntry, params: &FetchParams) -> Result<HttpRequest, SkipReason> {
        let request = entry
            .adapter()
            .build_request(entry.descriptor(), params)
            .map_err(|e| adapter_skip(entry.id(), &e))?;
        self.admit(entry.id())?;
        Ok(request)
    }

    fn admit(&self, id: &ProviderId) -> Result<(), SkipReason> {
        if !self.circuit.try_acquire(id) {
            return Err(SkipReason::CircuitOpen);
        }
        if let Err(denial) = self.limiter.acquire(id) {
            self.circuit.release_trial(id);
            return Err(skip_reason(denial));
        }
        Ok(())
    }

    /// One candidate: direct (or proxied, if already known to need it), plus
    /// a single proxied retry when a direct attempt fails in a way the relay
    /// can fix. Admission for the first send must already be held.
    async fn attempt_provider(
        &self,
        entry: &ProviderEntry,
        request: HttpRequest,
        deadline: Option<&Deadline>,
    ) -> ProviderAttempt {
        let id = entry.id();
        let mut route = if self.proxy.should_use_proxy(id) {
            Route::Proxy
        } else {
            Route::Direct
        };
        let mut made = 0;

        loop {
            let budget = AttemptBudget::for_deadline(deadline, entry.descriptor().timeout);
            made += 1;

            let (result, latency) = self
                .send(request.clone(), route, budget.timeout)
                .await
                .and_parse(entry);

            let failure = match result {
                Ok(payload) => {
                    self.record(entry, &request, route, AttemptOutcome::Success, latency, false);
                    return ProviderAttempt::Success {
                        payload,
                        used_proxy: route.is_proxy(),
                        made,
                    };
                }
                Err(failure) => failure,
            };

            let error = AttemptError {
                provider: id.clone(),
                outcome: failure.outcome,
                message: failure.message,
            };

            if failure.outcome == AttemptOutcome::Timeout && budget.bound_by_deadline {
                // The caller gave up, not the provider.
                self.circuit.release_trial(id);
                self.log_attempt(entry, &request, route, failure.outcome, latency, false);
                tracing::debug!(provider = %id, "Attempt abandoned at caller deadline");
                return ProviderAttempt::DeadlineExpired { error, made };
            }

            self.record(entry, &request, route, failure.outcome, latency, false);
            tracing::warn!(
                provider = %id,
                outcome = failure.outcome.as_str(),
                used_proxy = route.is_proxy(),
                latency_ms = latency.as_millis() as u64,
                error = %error.message,
                "Provider attempt failed"
            );

            let retry_via_proxy = route == Route::Direct
                && failure.outcome.triggers_proxy()
                && self.proxy.can_proxy(id)
                && !deadline.is_some_and(|d| d.is_expired());
            if retry_via_proxy && self.admit(id).is_ok() {
                tracing::info!(provider = %id, "Retrying through proxy");
                route = Route::Proxy;
                continue;
            }

            return ProviderAttempt::Failed { error, made };
        }
    }

    /// One transport round trip bounded by `timeout`.
    async fn send(
        &self,
        request: HttpRequest,
        route: Route,
        timeout: Duration,
    ) -> SendResult {
        let started = Instant::now();
        let result = match time::timeout(timeout, self.transport.send(request, route)).await {
            Err(_) => Err(AttemptFailure::new(
                AttemptOutcome::Timeout,
                format!("no response within {}ms", timeout.as_millis()),
            )),
            Ok(Err(e)) => Err(AttemptFailure::new(classify_transport(&e), e.to_string())),
            Ok(Ok(response)) => match classify_status(response.status) {
                Some(outcome) => Err(AttemptFailure::new(
                    outcome,
                    format!("upstream returned HTTP {}", response.status),
                )),
                None => Ok(response),
            },
        };
        SendResult {
            result,
            latency: started.elapsed(),
        }
    }

    /// Update stats, breaker, limiter and proxy router with an outcome, then
    /// log it. Shared by live attempts and health probes.
    fn record(
        &self,
        entry: &ProviderEntry,
        request: &HttpRequest,
        route: Route,
        outcome: AttemptOutcome,
        latency: Duration,
        probe: bool,
    ) {
        let id = entry.id();
        entry.with_state(|s| s.usage.record(outcome, latency, Instant::now()));
        self.circuit.record_outcome(id, outcome);

        match outcome {
            AttemptOutcome::Success => {
                self.limiter.record_success(id);
                if route == Route::Direct {
                    self.proxy.mark_direct_ok(id);
                }
            }
            AttemptOutcome::RateLimited => {
                self.limiter.record_rate_limited(id);
            }
            _ => {}
        }
        if route == Route::Direct && outcome.triggers_proxy() && self.proxy.can_proxy(id) {
            self.proxy.mark_needs_proxy(id, outcome.as_str());
        }

        self.log_attempt(entry, request, route, outcome, latency, probe);
    }

    fn log_attempt(
        &self,
        entry: &ProviderEntry,
        request: &HttpRequest,
        route: Route,
        outcome: AttemptOutcome,
        latency: Duration,
        probe: bool,
    ) {
        let started_at = SystemTime::now()
            .checked_sub(latency)
            .unwrap_or_else(SystemTime::now);
        let mut record = AttemptRecord::new(
            entry.id().clone(),
            request.redacted_endpoint(),
            started_at,
            latency,
            outcome,
            route.is_proxy(),
        );
        if probe {
            record = record.as_probe();
        }

        metrics::record_attempt(entry.id().as_str(), outcome.as_str(), route.is_proxy());
        self.sink.record(&StatsEvent::Attempt(&record));
        self.attempts.push(record);
    }

    /// Record an outcome observed outside the engine (e.g. by an embedder's
    /// own client) through the same path as live attempts.
    pub fn record_attempt(&self, id: &ProviderId, outcome: AttemptOutcome, latency: Duration) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };
        let request = HttpRequest::get(entry.descriptor().base_url.clone());
        self.record(&entry, &request, Route::Direct, outcome, latency, false);
        true
    }

    /// Health probe: admission and recording follow live attempts, but the
    /// probe only needs a 2xx, not a parseable payload.
    pub async fn probe(&self, entry: &ProviderEntry, timeout: Duration) -> ProbeResult {
        let id = entry.id();
        let request = match entry.adapter().probe_request(entry.descriptor()) {
            Ok(request) => request,
            Err(e) => return ProbeResult::Skipped(adapter_skip(id, &e)),
        };
        if let Err(reason) = self.admit(id) {
            return ProbeResult::Skipped(reason);
        }

        let route = if self.proxy.should_use_proxy(id) {
            Route::Proxy
        } else {
            Route::Direct
        };
        let sent = self.send(request.clone(), route, timeout).await;
        let outcome = match &sent.result {
            Ok(_) => AttemptOutcome::Success,
            Err(failure) => failure.outcome,
        };
        self.record(entry, &request, route, outcome, sent.latency, true);
        ProbeResult::Completed(outcome)
    }

    /// Ask up to `max_sources` eligible providers concurrently and reconcile
    /// the numbers found at `pointer`.
    pub async fn cross_validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationReport, CrossValidationError> {
        let pool = self.pools.pool_for(&request.category).map_err(|e| match e {
            PoolError::CategoryNotFound(category) => CrossValidationError::CategoryNotFound(category),
            other => CrossValidationError::InvalidRequest(other.to_string()),
        })?;
        if !request.pointer.is_empty() && !request.pointer.starts_with('/') {
            return Err(CrossValidationError::InvalidRequest(format!(
                "pointer '{}' must start with '/'",
                request.pointer
            )));
        }

        let max_sources = self.validator.config().max_sources.max(1);
        let mut skipped = Vec::new();
        let candidates = pool.select(&self.registry, |entry| match self.eligibility(entry.id()) {
            Ok(()) => true,
            Err(reason) => {
                skipped.push(SkippedCandidate {
                    provider: entry.id().clone(),
                    reason,
                });
                false
            }
        });

        let mut admitted = Vec::with_capacity(max_sources);
        for entry in candidates {
            if admitted.len() == max_sources {
                break;
            }
            match self.prepare(&entry, &request.params) {
                Ok(http_request) => admitted.push((entry, http_request)),
                Err(reason) => skipped.push(SkippedCandidate {
                    provider: entry.id().clone(),
                    reason,
                }),
            }
        }

        let deadline = request
            .deadline
            .or_else(|| self.settings.default_deadline.map(Deadline::after));
        let results = join_all(admitted.iter().map(|(entry, http_request)| {
            self.attempt_provider(entry, http_request.clone(), deadline.as_ref())
        }))
        .await;

        let mut samples = Vec::new();
        let mut failures = Vec::new();
        for ((entry, _), result) in admitted.iter().zip(results) {
            match result {
                ProviderAttempt::Success { payload, .. } => {
                    match extract_number(&payload, &request.pointer) {
                        Some(value) => samples.push(SourceSample {
                            provider: entry.id().clone(),
                            value,
                        }),
                        None => failures.push(AttemptError {
                            provider: entry.id().clone(),
                            outcome: AttemptOutcome::ParseError,
                            message: format!("no number at '{}'", request.pointer),
                        }),
                    }
                }
                ProviderAttempt::Failed { error, .. }
                | ProviderAttempt::DeadlineExpired { error, .. } => failures.push(error),
            }
        }

        let reconciliation = self.validator.reconcile(samples)?;
        if !reconciliation.outliers.is_empty() {
            tracing::info!(
                category = %request.category,
                outliers = ?reconciliation.outliers.iter().map(|s| s.provider.as_str()).collect::<Vec<_>>(),
                median = reconciliation.median,
                "Cross validation dropped outliers"
            );
        }

        Ok(ValidationReport {
            category: request.category,
            reconciliation,
            failures,
            skipped,
        })
    }

    pub fn provider_stats(&self) -> Vec<ProviderStats> {
        self.registry.stats()
    }

    pub fn recent_attempts(&self, limit: usize) -> Vec<AttemptRecord> {
        self.attempts.recent(limit)
    }

    pub fn pools(&self) -> Vec<PoolSnapshot> {
        self.pools.pools()
    }

    pub fn pool_manager(&self) -> &PoolManager {
        &self.pools
    }

    pub fn rotate_now(&self, pool_id: &str) -> Result<Option<ProviderId>, PoolError> {
        self.pools.rotate_now(pool_id)
    }

    pub fn rotation_history(&self, pool_id: &str, limit: usize) -> Result<Vec<RotationEvent>, PoolError> {
        self.pools.rotation_history(pool_id, limit)
    }

    pub fn circuit_state(&self, id: &ProviderId) -> CircuitState {
        self.circuit.state(id)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn sink(&self) -> &Arc<dyn StatsSink> {
        &self.sink
    }
}

struct SendResult {
    result: Result<HttpResponse, AttemptFailure>,
    latency: Duration,
}

impl SendResult {
    /// Run the adapter's parser over a successful response.
    fn and_parse(self, entry: &ProviderEntry) -> (Result<Value, AttemptFailure>, Duration) {
        let parsed = self.result.and_then(|response| {
            entry
                .adapter()
                .parse_response(entry.descriptor(), &response)
                .map_err(|e| AttemptFailure::new(AttemptOutcome::ParseError, e.to_string()))
        });
        (parsed, self.latency)
    }
}

fn skip_reason(denial: RateDenial) -> SkipReason {
    match denial {
        RateDenial::Exhausted { .. } => SkipReason::RateLimited,
        RateDenial::Backoff { .. } => SkipReason::Backoff,
    }
}

fn adapter_skip(id: &ProviderId, error: &AdapterError) -> SkipReason {
    tracing::warn!(provider = %id, error = %error, "Adapter could not build request");
    SkipReason::from(error)
}

fn extract_number(payload: &Value, pointer: &str) -> Option<f64> {
    let value = if pointer.is_empty() {
        payload
    } else {
        payload.pointer(pointer)?
    };
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
