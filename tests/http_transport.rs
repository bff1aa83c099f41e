//! The reqwest transport and a config-built engine against local backends.

use std::sync::Arc;

use serde_json::json;
use url::Url;

use feedgate::config::{parse_config, ProxyConfig, ProxyMode};
use feedgate::engine::{EngineBuilder, FetchRequest};
use feedgate::http::client::{HttpRequest, ReqwestTransport, Route, Transport, TransportError};

mod common;
use common::{closed_port, start_mock_backend, start_programmable_backend};

#[tokio::test]
async fn direct_request_returns_status_and_body() {
    let ok = start_mock_backend(r#"{"price":42}"#).await;
    let failing = start_programmable_backend(|_| async { (503, "{}".to_string()) }).await;
    let transport = ReqwestTransport::new().unwrap();

    let url = Url::parse(&format!("http://{ok}/price")).unwrap();
    let response = transport.send(HttpRequest::get(url), Route::Direct).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"price":42}"#);

    let url = Url::parse(&format!("http://{failing}/price")).unwrap();
    let response = transport.send(HttpRequest::get(url), Route::Direct).await.unwrap();
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let addr = closed_port().await;
    let transport = ReqwestTransport::new().unwrap();

    let url = Url::parse(&format!("http://{addr}/")).unwrap();
    let err = transport.send(HttpRequest::get(url), Route::Direct).await.unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
}

#[tokio::test]
async fn proxy_route_without_proxy_is_unavailable() {
    let transport = ReqwestTransport::new().unwrap();
    assert!(!transport.proxy_available());

    let url = Url::parse("http://127.0.0.1:9/").unwrap();
    let err = transport.send(HttpRequest::get(url), Route::Proxy).await.unwrap_err();
    assert_eq!(err, TransportError::ProxyUnavailable);
}

#[tokio::test]
async fn relay_receives_encoded_target() {
    let relay = start_programmable_backend(|target| async move {
        (200, json!({ "target": target }).to_string())
    })
    .await;
    let transport = ReqwestTransport::from_config(&ProxyConfig {
        enabled: true,
        mode: ProxyMode::Relay,
        url: Some(format!("http://{relay}/fetch?url=")),
        ..ProxyConfig::default()
    })
    .unwrap();
    assert!(transport.proxy_available());

    let url = Url::parse("https://api.example.com/v1/price?symbol=BTC").unwrap();
    let response = transport.send(HttpRequest::get(url), Route::Proxy).await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(
        body["target"],
        "/fetch?url=https%3A%2F%2Fapi.example.com%2Fv1%2Fprice%3Fsymbol%3DBTC"
    );
}

#[tokio::test]
async fn config_built_engine_falls_back_over_real_sockets() {
    let down = closed_port().await;
    let up = start_programmable_backend(|target| async move {
        if target == "/simple/btc?vs=usd" {
            (200, r#"{"data":{"price":"64000.5"}}"#.to_string())
        } else {
            (404, "{}".to_string())
        }
    })
    .await;

    let config = parse_config(&format!(
        r#"
        [[provider]]
        id = "primary"
        category = "market_price"
        base_url = "http://{down}/"
        priority = 10

        [[provider]]
        id = "secondary"
        category = "market_price"
        base_url = "http://{up}/"
        priority = 1
        adapter = {{ path = "simple/{{symbol}}", query = {{ vs = "{{vs}}" }}, pointer = "/data" }}

        [[pool]]
        id = "prices"
        category = "market_price"
        strategy = "priority"
        members = ["primary", "secondary"]
        "#
    ))
    .unwrap();

    let engine = EngineBuilder::from_config(&config, Arc::new(ReqwestTransport::new().unwrap()))
        .unwrap()
        .build()
        .unwrap();

    let response = engine
        .fetch(
            FetchRequest::new("market_price")
                .param("symbol", "btc")
                .param("vs", "usd"),
        )
        .await
        .unwrap();
    assert_eq!(response.provider.as_str(), "secondary");
    assert_eq!(response.attempts, 2);
    assert_eq!(response.payload, json!({"price": "64000.5"}));

    let attempts = engine.recent_attempts(2);
    assert_eq!(attempts[1].endpoint, format!("http://{down}/"));
}
