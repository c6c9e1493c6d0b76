//! In-app notifications and the outbound delivery queue.
//!
//! Fan-out writes a `Notification` (the in-app source of truth) and a
//! `QueuedDelivery` (the outbound at-least-once work item) together. The
//! delivery row keeps its terminal state for audit and is never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use vitalshare_core::{AppError, AppResult};

use crate::user::UserId;

/// Maximum sink attempts before a delivery is marked failed.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Unique identifier for a notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new random notification identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a notification identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a queued delivery row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Creates a new random delivery identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a delivery identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Kind of event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An owner recorded a new metric reading.
    MetricUpdate,
    /// Someone asked for access to the recipient's readings.
    AccessRequest,
    /// The recipient's access request was accepted.
    AccessGranted,
}

impl NotificationKind {
    /// Returns the storage string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetricUpdate => "metric_update",
            Self::AccessRequest => "access_request",
            Self::AccessGranted => "access_granted",
        }
    }

    /// Parses a storage string into a notification kind.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "metric_update" => Ok(Self::MetricUpdate),
            "access_request" => Ok(Self::AccessRequest),
            "access_granted" => Ok(Self::AccessGranted),
            _ => Err(AppError::Validation(format!(
                "unknown notification kind '{value}'"
            ))),
        }
    }
}

/// Lifecycle state of a queued delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker, delivery in flight.
    Processing,
    /// Sink accepted the delivery; terminal.
    Sent,
    /// Attempts exhausted; terminal, kept for audit.
    Failed,
}

impl DeliveryStatus {
    /// Returns the storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage string into a delivery status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown delivery status '{value}'"
            ))),
        }
    }
}

/// One in-app notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier of this notification.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Actor whose activity caused the notification.
    pub subject_id: UserId,
    /// Event kind.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Human-readable message body.
    pub body: String,
    /// Opaque structured payload for clients.
    pub data: Value,
    /// Whether the recipient has opened it.
    pub is_read: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unread notification.
    #[must_use]
    pub fn new(
        user_id: UserId,
        subject_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            subject_id,
            kind,
            title: title.into(),
            body: body.into(),
            data,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

/// One outbound delivery work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedDelivery {
    /// Identifier of this delivery.
    pub id: DeliveryId,
    /// Recipient.
    pub recipient_user_id: UserId,
    /// Event kind, mirrored from the notification.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Human-readable message body.
    pub body: String,
    /// Opaque structured payload handed to the sink.
    pub data: Value,
    /// Stable transport collapse key.
    pub tag: String,
    /// Lifecycle state.
    pub status: DeliveryStatus,
    /// Sink attempts so far; never exceeds [`MAX_DELIVERY_ATTEMPTS`].
    pub attempts: u32,
    /// Final sink error, kept for audit after exhaustion.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last claim timestamp.
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueuedDelivery {
    /// Creates a pending delivery mirroring a notification's content.
    #[must_use]
    pub fn for_notification(notification: &Notification, tag: impl Into<String>) -> Self {
        Self {
            id: DeliveryId::new(),
            recipient_user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title.clone(),
            body: notification.body.clone(),
            data: notification.data.clone(),
            tag: tag.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: notification.created_at,
            processed_at: None,
        }
    }
}

/// Collapse key for metric-update deliveries: near-duplicate readings from
/// one owner collapse into a single transport notification.
#[must_use]
pub fn metric_update_tag(owner_id: UserId) -> String {
    format!("health-update-{owner_id}")
}

/// Collapse key for access-request deliveries to one owner.
#[must_use]
pub fn access_request_tag(owner_id: UserId) -> String {
    format!("access-request-{owner_id}")
}

/// Collapse key for access-granted deliveries to one viewer.
#[must_use]
pub fn access_granted_tag(viewer_id: UserId) -> String {
    format!("access-granted-{viewer_id}")
}
