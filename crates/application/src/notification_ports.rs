//! Ports for notification storage, the delivery queue, and the outbound sink.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use vitalshare_core::AppResult;
use vitalshare_domain::{DeliveryId, Notification, NotificationId, QueuedDelivery, UserId};

/// Repository port for notification rows and the outbound delivery queue.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Writes all notification and delivery rows for one fan-out event.
    ///
    /// Atomic per event: either every row commits or none do. Partial
    /// fan-out is an invariant violation.
    async fn append_fan_out(
        &self,
        notifications: Vec<Notification>,
        deliveries: Vec<QueuedDelivery>,
    ) -> AppResult<()>;

    /// Lists a user's notifications, newest first.
    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<Notification>>;

    /// Flips one notification to read. Fails with not-found when the row
    /// does not exist or belongs to another user.
    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> AppResult<()>;

    /// Claims up to `limit` deliverable rows for exclusive processing.
    ///
    /// Eligible rows are `pending` with `attempts < max_attempts`, oldest
    /// first, plus `processing` rows whose claim is older than
    /// `visibility_timeout` (a worker that died after claiming). Claiming
    /// transitions them to `processing`, increments `attempts` and stamps
    /// `processed_at`, all atomically with lock-skip semantics so
    /// concurrent claimers never receive the same row. Expired claims with
    /// no attempts left are finalized as `failed` instead of re-issued.
    async fn claim_delivery_batch(
        &self,
        limit: usize,
        max_attempts: u32,
        visibility_timeout: Duration,
    ) -> AppResult<Vec<QueuedDelivery>>;

    /// Marks one processing row as sent.
    async fn mark_delivery_sent(&self, delivery_id: DeliveryId) -> AppResult<()>;

    /// Returns one processing row to pending for a future batch.
    async fn release_delivery_for_retry(&self, delivery_id: DeliveryId) -> AppResult<()>;

    /// Marks one processing row as failed, recording the final sink error.
    /// Terminal; the row is kept for audit.
    async fn mark_delivery_failed(
        &self,
        delivery_id: DeliveryId,
        error_message: &str,
    ) -> AppResult<()>;

    /// Returns one delivery row by id, any state.
    async fn find_delivery(&self, delivery_id: DeliveryId) -> AppResult<Option<QueuedDelivery>>;
}

/// Content handed to the transport for one outbound delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundNotification {
    /// Short headline.
    pub title: String,
    /// Human-readable message body.
    pub body: String,
    /// Opaque structured payload.
    pub data: Value,
    /// Stable collapse key for transport-side deduplication.
    pub tag: String,
}

impl From<&QueuedDelivery> for OutboundNotification {
    fn from(delivery: &QueuedDelivery) -> Self {
        Self {
            title: delivery.title.clone(),
            body: delivery.body.clone(),
            data: delivery.data.clone(),
            tag: delivery.tag.clone(),
        }
    }
}

/// Outbound transport port. The concrete channel (web push, email, SMS)
/// is a deployment concern.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Attempts to deliver one notification to a recipient.
    async fn send(&self, recipient: UserId, outbound: &OutboundNotification) -> AppResult<()>;
}
