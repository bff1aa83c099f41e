use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::PoolConfig;
use crate::engine::AttemptRecord;
use crate::health::ProviderStats;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::load_balancer::{PoolMember, PoolSnapshot, RotationEvent};
use crate::registry::ProviderId;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_ATTEMPTS_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub providers: usize,
    pub healthy_providers: usize,
    pub pools: usize,
    pub cache_entries: usize,
}

#[derive(Serialize)]
pub struct RotateResponse {
    pub pool: String,
    pub provider: Option<ProviderId>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let stats = state.engine.provider_stats();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        providers: stats.len(),
        healthy_providers: stats.iter().filter(|s| s.is_healthy()).count(),
        pools: state.engine.pools().len(),
        cache_entries: state.engine.cache().len(),
    })
}

pub async fn get_providers(State(state): State<AppState>) -> Json<Vec<ProviderStats>> {
    Json(state.engine.provider_stats())
}

pub async fn get_pools(State(state): State<AppState>) -> Json<Vec<PoolSnapshot>> {
    Json(state.engine.pools())
}

pub async fn create_pool(
    State(state): State<AppState>,
    Json(config): Json<PoolConfig>,
) -> Result<(StatusCode, Json<PoolSnapshot>), ApiError> {
    if config.id.trim().is_empty() || config.category.is_empty() {
        return Err(ApiError::BadRequest("pool id and category are required".into()));
    }
    let snapshot = state.engine.pool_manager().create_pool(&config)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Json(member): Json<PoolMember>,
) -> Result<Json<PoolSnapshot>, ApiError> {
    Ok(Json(state.engine.pool_manager().add_member(&pool_id, member)?))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((pool_id, provider)): Path<(String, String)>,
) -> Result<Json<PoolSnapshot>, ApiError> {
    let provider = ProviderId::new(provider);
    Ok(Json(state.engine.pool_manager().remove_member(&pool_id, &provider)?))
}

pub async fn rotate_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<RotateResponse>, ApiError> {
    let provider = state.engine.rotate_now(&pool_id)?;
    Ok(Json(RotateResponse {
        pool: pool_id,
        provider,
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RotationEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.engine.rotation_history(&pool_id, limit)?))
}

pub async fn get_attempts(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<AttemptRecord>> {
    Json(state.engine.recent_attempts(query.limit.unwrap_or(DEFAULT_ATTEMPTS_LIMIT)))
}
