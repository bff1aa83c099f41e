//! End-to-end fallback behaviour against a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use feedgate::adapter::JsonAdapter;
use feedgate::cache::CacheMode;
use feedgate::engine::{
    CrossValidationError, EngineBuilder, FetchError, FetchParams, FetchRequest, SkipReason,
    ValidationRequest,
};
use feedgate::health::passive::AttemptOutcome;
use feedgate::health::ProviderStats;
use feedgate::http::client::{Route, TransportError};
use feedgate::load_balancer::StrategyKind;
use feedgate::registry::Category;
use feedgate::resilience::CircuitState;
use serde_json::json;

mod common;
use common::{pool, priority_engine, provider, Reply, ScriptedTransport};

fn stats_for(engine: &feedgate::FallbackEngine, id: &str) -> ProviderStats {
    engine
        .provider_stats()
        .into_iter()
        .find(|s| s.id == id)
        .unwrap()
}

fn uncached() -> FetchRequest {
    FetchRequest::new("market_price").with_cache_mode(CacheMode::Bypass)
}

#[tokio::test(start_paused = true)]
async fn priority_pool_fails_over_while_circuit_is_open() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::Status(500)]);
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    transport.script("c.test", vec![Reply::json(r#"{"price":3}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 5), ("c", 1)]);

    for _ in 0..5 {
        let response = engine.fetch(uncached()).await.unwrap();
        assert_eq!(response.provider.as_str(), "b");
        assert_eq!(response.attempts, 2);
    }
    assert_eq!(engine.circuit_state(&"a".into()), CircuitState::Open);
    assert_eq!(transport.calls_to("a.test"), 5);

    // Open: A is skipped without a call.
    let response = engine.fetch(uncached()).await.unwrap();
    assert_eq!(response.provider.as_str(), "b");
    assert_eq!(response.attempts, 1);
    assert_eq!(transport.calls_to("a.test"), 5);

    transport.script("a.test", vec![Reply::json(r#"{"price":1}"#)]);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(engine.circuit_state(&"a".into()), CircuitState::HalfOpen);

    let response = engine.fetch(uncached()).await.unwrap();
    assert_eq!(response.provider.as_str(), "a");
    assert_eq!(response.payload, json!({"price": 1}));
    assert_eq!(engine.circuit_state(&"a".into()), CircuitState::Closed);
    assert_eq!(stats_for(&engine, "a").consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_429_escalates_backoff_and_routes_around() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::Status(429)]);
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 5)]);

    let response = engine.fetch(uncached()).await.unwrap();
    assert_eq!(response.provider.as_str(), "b");
    assert_eq!(response.attempts, 2);

    let a = stats_for(&engine, "a");
    assert_eq!(a.rate_limit_hits, 1);
    assert!(a.in_backoff);
    assert_eq!(a.consecutive_failures, 0);
    assert_eq!(a.circuit_state, CircuitState::Closed);

    // 120 s, 240 s, then the 600 s blacklist window.
    for (step, backoff_secs) in [120u64, 240, 600].into_iter().enumerate() {
        let calls = step + 1;
        tokio::time::advance(Duration::from_secs(backoff_secs - 1)).await;
        let response = engine.fetch(uncached()).await.unwrap();
        assert_eq!(response.provider.as_str(), "b");
        assert_eq!(response.attempts, 1, "a should be in backoff at step {step}");
        assert_eq!(transport.calls_to("a.test"), calls);

        tokio::time::advance(Duration::from_secs(2)).await;
        let response = engine.fetch(uncached()).await.unwrap();
        assert_eq!(response.provider.as_str(), "b");
        assert_eq!(transport.calls_to("a.test"), calls + 1);
    }

    assert_eq!(engine.circuit_state(&"a".into()), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn serves_stale_cache_when_every_provider_fails() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        "a.test",
        vec![Reply::json(r#"{"price":1}"#), Reply::Status(500)],
    );
    let engine = priority_engine(transport.clone(), &[("a", 1)]);
    let request = || FetchRequest::new("market_price").param("symbol", "BTC");

    let live = engine.fetch(request()).await.unwrap();
    assert!(!live.from_cache);

    tokio::time::advance(Duration::from_secs(30)).await;
    let fresh = engine.fetch(request()).await.unwrap();
    assert!(fresh.from_cache);
    assert!(!fresh.stale);
    assert_eq!(fresh.attempts, 0);
    assert_eq!(transport.calls_to("a.test"), 1);

    tokio::time::advance(Duration::from_secs(370)).await;
    let stale = engine.fetch(request()).await.unwrap();
    assert!(stale.stale);
    assert!(stale.from_cache);
    assert_eq!(stale.attempts, 1);
    assert_eq!(stale.age, Some(Duration::from_secs(400)));
    assert_eq!(stale.payload, json!({"price": 1}));

    tokio::time::advance(Duration::from_secs(3_600)).await;
    let err = engine.fetch(request()).await.unwrap_err();
    match err {
        FetchError::AllProvidersFailed { last_error, attempts, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(last_error.outcome, AttemptOutcome::HttpServerError);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn bypass_never_serves_stale() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        "a.test",
        vec![Reply::json(r#"{"price":1}"#), Reply::Status(503)],
    );
    let engine = priority_engine(transport.clone(), &[("a", 1)]);

    engine.fetch(FetchRequest::new("market_price")).await.unwrap();
    let err = engine
        .fetch(FetchRequest::new("market_price").with_cache_mode(CacheMode::Bypass))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_skips_fresh_cache_but_writes_through() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        "a.test",
        vec![Reply::json(r#"{"price":1}"#), Reply::json(r#"{"price":2}"#)],
    );
    let engine = priority_engine(transport.clone(), &[("a", 1)]);

    engine.fetch(FetchRequest::new("market_price")).await.unwrap();
    let refreshed = engine
        .fetch(FetchRequest::new("market_price").with_cache_mode(CacheMode::Refresh))
        .await
        .unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(refreshed.payload, json!({"price": 2}));

    let cached = engine.fetch(FetchRequest::new("market_price")).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.payload, json!({"price": 2}));
}

#[tokio::test]
async fn unknown_category_and_empty_pool() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = EngineBuilder::new(transport)
        .pool(pool("empty", "news", StrategyKind::RoundRobin, &[]))
        .build()
        .unwrap();

    let err = engine.fetch(FetchRequest::new("ohlcv")).await.unwrap_err();
    assert_eq!(err, FetchError::CategoryNotFound(Category::new("ohlcv")));

    let err = engine.fetch(FetchRequest::new("News")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::PoolExhausted {
            pool: "empty".into(),
            skipped: Vec::new(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn blocked_direct_attempt_retries_through_proxy() {
    let transport = Arc::new(ScriptedTransport::with_proxy());
    transport.script(
        "a.test",
        vec![Reply::Error(TransportError::Connect("connection refused".into()))],
    );
    transport.script_route("a.test", Route::Proxy, vec![Reply::json(r#"{"price":1}"#)]);

    let engine = EngineBuilder::new(transport.clone())
        .provider(
            provider("a", "market_price", 1).with_proxy_support(true),
            Arc::new(JsonAdapter::default()),
        )
        .pool(pool("prices", "market_price", StrategyKind::Priority, &["a"]))
        .build()
        .unwrap();

    let response = engine.fetch(uncached()).await.unwrap();
    assert!(response.used_proxy);
    assert_eq!(response.attempts, 2);
    let routes: Vec<Route> = transport.calls().iter().map(|c| c.route).collect();
    assert_eq!(routes, vec![Route::Direct, Route::Proxy]);
    assert!(stats_for(&engine, "a").proxy_required);

    // The requirement sticks: next fetch goes straight to the proxy.
    let response = engine.fetch(uncached()).await.unwrap();
    assert!(response.used_proxy);
    assert_eq!(response.attempts, 1);
    assert_eq!(transport.calls().last().map(|c| c.route), Some(Route::Proxy));

    // Until the decision expires.
    tokio::time::advance(Duration::from_secs(301)).await;
    engine.fetch(uncached()).await.unwrap();
    let routes: Vec<Route> = transport.calls().iter().map(|c| c.route).collect();
    assert_eq!(&routes[3..], &[Route::Direct, Route::Proxy]);
}

#[tokio::test(start_paused = true)]
async fn no_proxy_retry_without_support() {
    let transport = Arc::new(ScriptedTransport::with_proxy());
    transport.script("a.test", vec![Reply::Status(403)]);
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 1)]);

    let response = engine.fetch(uncached()).await.unwrap();
    assert_eq!(response.provider.as_str(), "b");
    assert_eq!(response.attempts, 2);
    assert!(!response.used_proxy);
    assert!(transport.calls().iter().all(|c| c.route == Route::Direct));
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_does_not_penalize_provider() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        "a.test",
        vec![Reply::after(Duration::from_secs(10), Reply::json(r#"{"price":1}"#))],
    );
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 1)]);

    let err = engine
        .fetch(uncached().within(Duration::from_secs(2)))
        .await
        .unwrap_err();
    match err {
        FetchError::AllProvidersFailed { last_error, attempts, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(last_error.outcome, AttemptOutcome::Timeout);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls_to("b.test"), 0);

    let a = stats_for(&engine, "a");
    assert_eq!(a.consecutive_failures, 0);
    assert_eq!(a.total_requests, 0);
    assert_eq!(engine.recent_attempts(1)[0].outcome, AttemptOutcome::Timeout);
}

#[tokio::test(start_paused = true)]
async fn provider_timeout_counts_as_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        "a.test",
        vec![Reply::after(Duration::from_secs(10), Reply::json(r#"{"price":1}"#))],
    );
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 1)]);

    let response = engine
        .fetch(uncached().within(Duration::from_secs(20)))
        .await
        .unwrap();
    assert_eq!(response.provider.as_str(), "b");
    assert_eq!(response.attempts, 2);
    assert!(response.elapsed >= Duration::from_secs(5));
    assert_eq!(stats_for(&engine, "a").consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn unusable_payload_is_a_parse_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::json("<html>blocked</html>")]);
    transport.script("b.test", vec![Reply::json(r#"{"price":2}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 10), ("b", 1)]);

    let response = engine.fetch(uncached()).await.unwrap();
    assert_eq!(response.provider.as_str(), "b");
    let attempts = engine.recent_attempts(2);
    assert_eq!(attempts[1].outcome, AttemptOutcome::ParseError);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_is_reported_as_skipped() {
    let transport = Arc::new(ScriptedTransport::new());
    let engine = priority_engine(transport.clone(), &[("a", 1)]);
    for _ in 0..5 {
        engine.record_attempt(&"a".into(), AttemptOutcome::ConnectionError, Duration::from_millis(3));
    }

    let err = engine.fetch(uncached()).await.unwrap_err();
    match err {
        FetchError::PoolExhausted { skipped, .. } => {
            assert_eq!(skipped.len(), 1);
            assert_eq!(skipped[0].reason, SkipReason::CircuitOpen);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls().len(), 0);
}

fn validation() -> ValidationRequest {
    ValidationRequest {
        category: Category::new("market_price"),
        params: FetchParams::new(),
        pointer: "/price".into(),
        deadline: None,
    }
}

#[tokio::test(start_paused = true)]
async fn cross_validation_drops_outlier() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::json(r#"{"price":100}"#)]);
    transport.script("b.test", vec![Reply::json(r#"{"price":101}"#)]);
    transport.script("c.test", vec![Reply::json(r#"{"price":"140"}"#)]);
    transport.script("d.test", vec![Reply::json(r#"{"price":99}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 4), ("b", 3), ("c", 2), ("d", 1)]);

    let report = engine.cross_validate(validation()).await.unwrap();
    let result = &report.reconciliation;
    assert!((result.value - 100.5).abs() < 1e-9);
    assert_eq!(result.responders, 3);
    assert_eq!(result.outliers.len(), 1);
    assert_eq!(result.outliers[0].provider.as_str(), "c");
    assert!((result.confidence - 0.6003).abs() < 0.001);
    assert!(report.failures.is_empty());
    // Only the top three are asked.
    assert_eq!(transport.calls_to("d.test"), 0);
}

#[tokio::test(start_paused = true)]
async fn cross_validation_without_agreement_is_an_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::json(r#"{"price":100}"#)]);
    transport.script("b.test", vec![Reply::json(r#"{"price":120}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 2), ("b", 1)]);

    let err = engine.cross_validate(validation()).await.unwrap_err();
    assert_eq!(
        err,
        CrossValidationError::NoAgreement {
            required: 2,
            agreeing: 0,
            responders: 2,
            median: 110.0,
        }
    );
    // Both answered; disagreement is not a provider failure.
    assert_eq!(stats_for(&engine, "a").consecutive_failures, 0);
    assert_eq!(stats_for(&engine, "b").consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn cross_validation_needs_enough_numbers() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.script("a.test", vec![Reply::json(r#"{"price":100}"#)]);
    transport.script("b.test", vec![Reply::Status(500)]);
    transport.script("c.test", vec![Reply::json(r#"{"last":100}"#)]);
    let engine = priority_engine(transport.clone(), &[("a", 3), ("b", 2), ("c", 1)]);

    let err = engine.cross_validate(validation()).await.unwrap_err();
    assert_eq!(err, CrossValidationError::InsufficientSources { required: 2, got: 1 });
    assert_eq!(stats_for(&engine, "b").consecutive_failures, 1);
}
