//! HTTP handlers.

pub mod metrics;
pub mod notifications;
pub mod sharing;
pub mod sync;

use axum::Json;
use serde::Serialize;

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness probe.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
