//! HTTP push relay sink.
//!
//! Posts one JSON payload per delivery to a push relay endpoint. Retry
//! policy lives in the delivery queue, not here: any transport failure or
//! non-success status surfaces as an error for the caller to count as a
//! failed attempt.

use async_trait::async_trait;
use vitalshare_application::{NotificationSink, OutboundNotification};
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::UserId;

/// Configuration for the HTTP push sink.
#[derive(Debug, Clone)]
pub struct HttpPushSinkConfig {
    /// Push relay endpoint receiving delivery payloads.
    pub endpoint: String,
    /// Bearer token presented to the relay.
    pub auth_token: String,
}

/// Push relay implementation of the notification sink port.
pub struct HttpPushSink {
    http_client: reqwest::Client,
    config: HttpPushSinkConfig,
}

impl HttpPushSink {
    /// Creates a sink with a configured HTTP client and relay settings.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: HttpPushSinkConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }
}

#[async_trait]
impl NotificationSink for HttpPushSink {
    async fn send(&self, recipient: UserId, outbound: &OutboundNotification) -> AppResult<()> {
        let payload = serde_json::json!({
            "user_id": recipient,
            "title": outbound.title,
            "body": outbound.body,
            "data": outbound.data,
            "tag": outbound.tag,
        });

        let response = self
            .http_client
            .post(self.config.endpoint.as_str())
            .bearer_auth(self.config.auth_token.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("push relay transport error: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Internal(format!(
                "push relay rejected delivery with status {status}: {body}"
            )));
        }

        Ok(())
    }
}
