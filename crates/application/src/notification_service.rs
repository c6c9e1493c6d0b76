//! Notification fan-out engine.
//!
//! Translates one domain event into zero-or-more Notification plus
//! QueuedDelivery row pairs, written atomically per event, then publishes
//! change events for the recipients.

use std::sync::Arc;

use serde_json::json;
use vitalshare_core::AppResult;
use vitalshare_domain::{
    AccessRequest, MetricReading, Notification, NotificationId, NotificationKind, QueuedDelivery,
    ReadingPermission, UserId, access_granted_tag, access_request_tag, format_metric_value,
    metric_update_tag,
};

use crate::notification_ports::NotificationRepository;
use crate::realtime_ports::{ChangeEvent, ChangePublisher, ChangeTopic};
use crate::sharing_ports::SharingRepository;
use crate::user_ports::UserDirectory;

#[cfg(test)]
mod tests;

/// Fan-out and in-app notification service.
#[derive(Clone)]
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    sharing_repository: Arc<dyn SharingRepository>,
    user_directory: Arc<dyn UserDirectory>,
    change_publisher: Arc<dyn ChangePublisher>,
}

impl NotificationService {
    /// Creates a notification service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        sharing_repository: Arc<dyn SharingRepository>,
        user_directory: Arc<dyn UserDirectory>,
        change_publisher: Arc<dyn ChangePublisher>,
    ) -> Self {
        Self {
            repository,
            sharing_repository,
            user_directory,
            change_publisher,
        }
    }

    /// Fans out one recorded metric reading to every active viewer.
    ///
    /// Returns the number of recipients. All rows for the event commit in
    /// one repository transaction; zero active viewers means zero writes.
    pub async fn metric_recorded(&self, reading: &MetricReading) -> AppResult<usize> {
        let viewer_ids = self
            .sharing_repository
            .list_active_viewer_ids(reading.owner_id)
            .await?;
        if viewer_ids.is_empty() {
            return Ok(0);
        }

        let owner_name = self.display_name(reading.owner_id).await?;
        let tag = metric_update_tag(reading.owner_id);
        let body = format!(
            "{owner_name} recorded a new {} reading: {} {}",
            reading.label(),
            format_metric_value(reading.value),
            reading.unit
        );
        let data = json!({
            "kind": NotificationKind::MetricUpdate.as_str(),
            "owner_id": reading.owner_id,
            "metric_type": reading.metric_type,
            "value": reading.value,
            "unit": reading.unit,
            "recorded_at": reading.recorded_at,
            "tag": tag,
        });

        let mut notifications = Vec::with_capacity(viewer_ids.len());
        let mut deliveries = Vec::with_capacity(viewer_ids.len());
        for viewer_id in &viewer_ids {
            let notification = Notification::new(
                *viewer_id,
                reading.owner_id,
                NotificationKind::MetricUpdate,
                "New health reading",
                body.clone(),
                data.clone(),
            );
            deliveries.push(QueuedDelivery::for_notification(&notification, tag.clone()));
            notifications.push(notification);
        }

        let recipient_count = notifications.len();
        self.repository
            .append_fan_out(notifications, deliveries)
            .await?;

        for viewer_id in viewer_ids {
            self.change_publisher
                .publish(ChangeEvent::new(ChangeTopic::Notifications, viewer_id))
                .await?;
        }

        Ok(recipient_count)
    }

    /// Notifies an owner that someone asked for access to their readings.
    pub async fn access_request_created(&self, request: &AccessRequest) -> AppResult<()> {
        let requester_name = self.display_name(request.requester_id).await?;
        let tag = access_request_tag(request.owner_id);
        let data = json!({
            "kind": NotificationKind::AccessRequest.as_str(),
            "request_id": request.id,
            "requester_id": request.requester_id,
            "message": request.message,
            "tag": tag,
        });

        let notification = Notification::new(
            request.owner_id,
            request.requester_id,
            NotificationKind::AccessRequest,
            "New access request",
            format!("{requester_name} wants to see your health readings."),
            data,
        );
        let delivery = QueuedDelivery::for_notification(&notification, tag);

        self.repository
            .append_fan_out(vec![notification], vec![delivery])
            .await?;
        self.change_publisher
            .publish(ChangeEvent::new(
                ChangeTopic::Notifications,
                request.owner_id,
            ))
            .await
    }

    /// Notifies a requester that their access request was accepted.
    pub async fn access_request_accepted(
        &self,
        request: &AccessRequest,
        permission: &ReadingPermission,
    ) -> AppResult<()> {
        let owner_name = self.display_name(request.owner_id).await?;
        let tag = access_granted_tag(request.requester_id);
        let data = json!({
            "kind": NotificationKind::AccessGranted.as_str(),
            "owner_id": request.owner_id,
            "request_id": request.id,
            "permission_id": permission.id,
            "tag": tag,
        });

        let notification = Notification::new(
            request.requester_id,
            request.owner_id,
            NotificationKind::AccessGranted,
            "Access granted",
            format!("{owner_name} granted you access to their health readings."),
            data,
        );
        let delivery = QueuedDelivery::for_notification(&notification, tag);

        self.repository
            .append_fan_out(vec![notification], vec![delivery])
            .await?;
        self.change_publisher
            .publish(ChangeEvent::new(
                ChangeTopic::Notifications,
                request.requester_id,
            ))
            .await
    }

    /// Lists a user's in-app notifications, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<Notification>> {
        self.repository.list_for_user(user_id).await
    }

    /// Marks one of the user's notifications as read.
    pub async fn mark_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> AppResult<()> {
        self.repository
            .mark_notification_read(user_id, notification_id)
            .await?;
        self.change_publisher
            .publish(ChangeEvent::new(ChangeTopic::Notifications, user_id))
            .await
    }

    async fn display_name(&self, user_id: UserId) -> AppResult<String> {
        Ok(self
            .user_directory
            .find_profile(user_id)
            .await?
            .map(|profile| profile.display_name().to_owned())
            .unwrap_or_else(|| "Someone".to_owned()))
    }
}
