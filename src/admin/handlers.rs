use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::registry::ServiceName;
use crate::resilience::{BreakerSnapshot, BreakerState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub order_service: String,
    pub breakers: usize,
    pub open_breakers: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshots = state.breakers.snapshots();
    let open_breakers = snapshots
        .iter()
        .filter(|s| s.state != BreakerState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_breakers == 0 { "operational" } else { "degraded" },
        order_service: state.config.gateway.order_service.clone(),
        breakers: snapshots.len(),
        open_breakers,
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

/// Force one breaker back to closed with a fresh window.
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path((service, operation)): Path<(String, String)>,
) -> Result<Json<BreakerSnapshot>, StatusCode> {
    let service = ServiceName::new(&service).map_err(|_| StatusCode::NOT_FOUND)?;
    let breaker = state
        .breakers
        .find(&service, &operation)
        .ok_or(StatusCode::NOT_FOUND)?;

    breaker.reset();
    tracing::info!(breaker = %breaker.key(), "Breaker reset by admin");
    Ok(Json(breaker.snapshot()))
}
