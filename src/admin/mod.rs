//! Operator surface: status, breaker snapshots and resets.
//!
//! Mounted only when `admin.enabled`; every route requires
//! `Authorization: Bearer {api_key}`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{service}/{operation}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
