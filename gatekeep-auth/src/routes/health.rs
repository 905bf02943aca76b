use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use gatekeep_shared::types::api::{HealthResponse, HealthStatus};

use crate::AppState;

/// 503 while the verification store is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let status = match state.codes.ping().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = ?e, "verification store unreachable");
            HealthStatus::Unhealthy
        }
    };
    let body = HealthResponse::new(status, "gatekeep-auth", env!("CARGO_PKG_VERSION"));
    let code = if body.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Prometheus scrape. 404 when no recorder was installed.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
