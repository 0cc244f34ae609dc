use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/store", get(store_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "store": {
            "backend": state.store().backend_name(),
        }
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping() {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Store not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn store_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let result = state.store().ping();
    let latency_us = start.elapsed().as_micros() as u64;

    let (status, healthy) = match &result {
        Ok(()) => (StatusCode::OK, true),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, false)
        }
    };

    (
        status,
        Json(serde_json::json!({
            "healthy": healthy,
            "backend": state.store().backend_name(),
            "latencyUs": latency_us,
        })),
    )
}
