//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Translate query strings into fetch and validation requests
//! - Serve until the shutdown broadcast fires

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::CacheMode;
use crate::engine::{
    FallbackEngine, FetchParams, FetchRequest, FetchResponse, ValidationReport, ValidationRequest,
};
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::registry::Category;
use crate::resilience::Deadline;

/// Query parameters with engine meaning; everything else goes to the provider.
const DEADLINE_PARAM: &str = "deadline_ms";
const CACHE_PARAM: &str = "cache";
const POINTER_PARAM: &str = "pointer";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FallbackEngine>,
    pub admin_api_key: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<FallbackEngine>, admin_api_key: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            admin_api_key: admin_api_key.into(),
            started_at: Instant::now(),
        }
    }
}

/// Public HTTP front of the engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// The router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/v1/fetch/{category}", get(fetch_handler))
            .route("/v1/validate/{category}", get(validate_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request_id(request),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn fetch_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<FetchResponse>, ApiError> {
    let mut request = FetchRequest::new(category);
    let mut params = FetchParams::new();
    for (key, value) in query {
        match key.as_str() {
            DEADLINE_PARAM => request = request.with_deadline(parse_deadline(&value)?),
            CACHE_PARAM => {
                let mode = value.parse::<CacheMode>().map_err(ApiError::BadRequest)?;
                request = request.with_cache_mode(mode);
            }
            _ => params.insert(key, value),
        }
    }

    let response = state.engine.fetch(request.with_params(params)).await?;
    Ok(Json(response))
}

async fn validate_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<ValidationReport>, ApiError> {
    let mut deadline = None;
    let mut pointer = String::new();
    let mut params = FetchParams::new();
    for (key, value) in query {
        match key.as_str() {
            DEADLINE_PARAM => deadline = Some(parse_deadline(&value)?),
            POINTER_PARAM => pointer = value,
            _ => params.insert(key, value),
        }
    }

    let report = state
        .engine
        .cross_validate(ValidationRequest {
            category: Category::new(category),
            params,
            pointer,
            deadline,
        })
        .await?;
    Ok(Json(report))
}

async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.provider_stats();
    let healthy = stats.iter().filter(|s| s.is_healthy()).count();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "providers": stats.len(),
            "healthy_providers": healthy,
        })),
    )
}

fn parse_deadline(value: &str) -> Result<Deadline, ApiError> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Deadline::after(Duration::from_millis(ms))),
        _ => Err(ApiError::BadRequest(format!(
            "{DEADLINE_PARAM} must be a positive integer, got '{value}'"
        ))),
    }
}
