//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod metric;
mod notification;
mod sharing;
mod user;

pub use metric::{MetricReading, format_metric_value, metric_label};
pub use notification::{
    DeliveryId, DeliveryStatus, MAX_DELIVERY_ATTEMPTS, Notification, NotificationId,
    NotificationKind, QueuedDelivery, access_granted_tag, access_request_tag, metric_update_tag,
};
pub use sharing::{
    AccessRequest, PermissionId, PermissionStatus, ReadingPermission, RequestId, RequestStatus,
};
pub use user::{EmailAddress, UserId, UserProfile};
