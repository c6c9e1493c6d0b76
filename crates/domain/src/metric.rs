//! Health-metric reading events.
//!
//! Metric storage is an external collaborator; it reports successful writes
//! as `MetricReading` events which drive notification fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitalshare_core::{AppError, AppResult};

use crate::user::UserId;

/// One recorded health-metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    /// User the reading belongs to.
    pub owner_id: UserId,
    /// Machine name of the metric, e.g. `heart_rate`.
    pub metric_type: String,
    /// Recorded value.
    pub value: f64,
    /// Unit string, e.g. `bpm`.
    pub unit: String,
    /// When the reading was taken.
    pub recorded_at: DateTime<Utc>,
}

impl MetricReading {
    /// Creates a validated metric reading.
    pub fn new(
        owner_id: UserId,
        metric_type: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let metric_type = metric_type.into();
        if metric_type.trim().is_empty() {
            return Err(AppError::Validation(
                "metric_type must not be empty".to_owned(),
            ));
        }
        if !value.is_finite() {
            return Err(AppError::Validation(
                "metric value must be a finite number".to_owned(),
            ));
        }

        Ok(Self {
            owner_id,
            metric_type,
            value,
            unit: unit.into(),
            recorded_at,
        })
    }

    /// Returns the human-readable metric label.
    #[must_use]
    pub fn label(&self) -> String {
        metric_label(self.metric_type.as_str())
    }
}

/// Turns a machine metric name into a human label: underscores become spaces.
#[must_use]
pub fn metric_label(metric_type: &str) -> String {
    metric_type.trim().replace('_', " ")
}

/// Renders a metric value for message bodies, trimming a whole-number float
/// to its integer form so `72.0` reads as `72`.
#[must_use]
pub fn format_metric_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
