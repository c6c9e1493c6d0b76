//! Metric reading event intake.
//!
//! Metric storage lives elsewhere; this endpoint receives the reading
//! event after a successful write and drives notification fan-out.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitalshare_domain::MetricReading;

use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;


#[derive(Debug, Deserialize)]
pub struct RecordMetricEventRequest {
    pub metric_type: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RecordMetricEventResponse {
    pub notified: usize,
}

pub async fn record_metric_event_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<RecordMetricEventRequest>,
) -> ApiResult<(StatusCode, Json<RecordMetricEventResponse>)> {
    let reading = MetricReading::new(
        user_id,
        payload.metric_type,
        payload.value,
        payload.unit,
        payload.recorded_at.unwrap_or_else(Utc::now),
    )?;

    let notified = state.notification_service.metric_recorded(&reading).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RecordMetricEventResponse { notified }),
    ))
}
