pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/providers", get(get_providers))
        .route("/admin/pools", get(get_pools).post(create_pool))
        .route("/admin/pools/{id}/members", post(add_member))
        .route("/admin/pools/{id}/members/{provider}", delete(remove_member))
        .route("/admin/pools/{id}/rotate", post(rotate_pool))
        .route("/admin/pools/{id}/history", get(get_history))
        .route("/admin/attempts", get(get_attempts))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
