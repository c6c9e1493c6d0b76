//! Application services and ports.

#![forbid(unsafe_code)]

mod delivery_service;
mod notification_ports;
mod notification_service;
mod realtime_ports;
mod sharing_ports;
mod sharing_service;
mod sync_client;
#[cfg(test)]
mod test_support;
mod user_ports;

pub use delivery_service::{DeliveryBatchOutcome, DeliveryConfig, DeliveryService};
pub use notification_ports::{NotificationRepository, NotificationSink, OutboundNotification};
pub use notification_service::NotificationService;
pub use realtime_ports::{ChangeEvent, ChangePublisher, ChangeSubscriber, ChangeTopic};
pub use sharing_ports::{AcceptOutcome, SharingRepository};
pub use sharing_service::SharingService;
pub use sync_client::{SharedStateSnapshot, SyncClient};
pub use user_ports::UserDirectory;
