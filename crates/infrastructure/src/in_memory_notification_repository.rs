//! In-memory notification repository for tests and local development.
//!
//! Mirrors the Postgres claim state machine: claiming moves pending rows to
//! processing under one lock, so concurrent claimers never share a row, and
//! claims older than the visibility timeout become claimable again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use vitalshare_application::NotificationRepository;
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    DeliveryId, DeliveryStatus, Notification, NotificationId, QueuedDelivery, UserId,
};

#[derive(Default)]
struct NotificationState {
    notifications: Vec<Notification>,
    deliveries: Vec<QueuedDelivery>,
}

/// In-memory implementation of the notification repository port.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    state: Mutex<NotificationState>,
}

impl InMemoryNotificationRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn finish(
        &self,
        delivery_id: DeliveryId,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let delivery = state
            .deliveries
            .iter_mut()
            .find(|delivery| delivery.id == delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery '{delivery_id}'")))?;
        if delivery.status != DeliveryStatus::Processing {
            return Err(AppError::Conflict(format!(
                "delivery '{delivery_id}' is not processing"
            )));
        }
        delivery.status = status;
        if let Some(message) = error_message {
            delivery.last_error = Some(message.to_owned());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn append_fan_out(
        &self,
        notifications: Vec<Notification>,
        deliveries: Vec<QueuedDelivery>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.notifications.extend(notifications);
        state.deliveries.extend(deliveries);
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(rows)
    }

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|notification| {
                notification.id == notification_id && notification.user_id == user_id
            })
            .ok_or_else(|| AppError::NotFound(format!("notification '{notification_id}'")))?;
        notification.is_read = true;
        Ok(())
    }

    async fn claim_delivery_batch(
        &self,
        limit: usize,
        max_attempts: u32,
        visibility_timeout: Duration,
    ) -> AppResult<Vec<QueuedDelivery>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let stale_before = now
            - chrono::Duration::from_std(visibility_timeout).map_err(|error| {
                AppError::Validation(format!("visibility timeout out of range: {error}"))
            })?;
        let mut claimed = Vec::new();

        let mut indexes: Vec<usize> = (0..state.deliveries.len()).collect();
        indexes.sort_by_key(|index| state.deliveries[*index].created_at);

        for index in indexes {
            let delivery = &mut state.deliveries[index];
            let claim_expired = delivery.status == DeliveryStatus::Processing
                && delivery.processed_at.is_some_and(|at| at < stale_before);
            if claim_expired && delivery.attempts >= max_attempts {
                delivery.status = DeliveryStatus::Failed;
                delivery.last_error = Some("claim expired with no attempts left".to_owned());
                continue;
            }
            if claimed.len() >= limit {
                continue;
            }
            let claimable = delivery.status == DeliveryStatus::Pending || claim_expired;
            if claimable && delivery.attempts < max_attempts {
                delivery.status = DeliveryStatus::Processing;
                delivery.attempts += 1;
                delivery.processed_at = Some(now);
                claimed.push(delivery.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_delivery_sent(&self, delivery_id: DeliveryId) -> AppResult<()> {
        self.finish(delivery_id, DeliveryStatus::Sent, None).await
    }

    async fn release_delivery_for_retry(&self, delivery_id: DeliveryId) -> AppResult<()> {
        self.finish(delivery_id, DeliveryStatus::Pending, None).await
    }

    async fn mark_delivery_failed(
        &self,
        delivery_id: DeliveryId,
        error_message: &str,
    ) -> AppResult<()> {
        self.finish(delivery_id, DeliveryStatus::Failed, Some(error_message))
            .await
    }

    async fn find_delivery(&self, delivery_id: DeliveryId) -> AppResult<Option<QueuedDelivery>> {
        Ok(self
            .state
            .lock()
            .await
            .deliveries
            .iter()
            .find(|delivery| delivery.id == delivery_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vitalshare_domain::{
        MAX_DELIVERY_ATTEMPTS, Notification, NotificationKind, metric_update_tag,
    };

    use super::*;

    const VISIBILITY: Duration = Duration::from_secs(60);

    fn delivery_for(owner: UserId, viewer: UserId) -> QueuedDelivery {
        let notification = Notification::new(
            viewer,
            owner,
            NotificationKind::MetricUpdate,
            "New health reading",
            "Ada recorded a new heart rate reading: 72 bpm",
            json!({ "metric_type": "heart_rate" }),
        );
        QueuedDelivery::for_notification(&notification, metric_update_tag(owner))
    }

    #[tokio::test]
    async fn claim_transitions_rows_and_counts_attempts() {
        let repository = InMemoryNotificationRepository::new();
        let delivery = delivery_for(UserId::new(), UserId::new());
        repository
            .append_fan_out(Vec::new(), vec![delivery.clone()])
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        let claimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, DeliveryStatus::Processing);
        assert_eq!(claimed[0].attempts, 1);

        // Already processing, nothing left to claim.
        let empty = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn concurrent_claimers_never_share_a_row() {
        let repository = Arc::new(InMemoryNotificationRepository::new());
        let owner = UserId::new();
        for _ in 0..8 {
            repository
                .append_fan_out(Vec::new(), vec![delivery_for(owner, UserId::new())])
                .await
                .unwrap_or_else(|_| panic!("append failed"));
        }

        let first = {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository.claim_delivery_batch(8, MAX_DELIVERY_ATTEMPTS, VISIBILITY).await
            })
        };
        let second = {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository.claim_delivery_batch(8, MAX_DELIVERY_ATTEMPTS, VISIBILITY).await
            })
        };

        let first = first
            .await
            .unwrap_or_else(|_| panic!("join failed"))
            .unwrap_or_else(|_| panic!("claim failed"));
        let second = second
            .await
            .unwrap_or_else(|_| panic!("join failed"))
            .unwrap_or_else(|_| panic!("claim failed"));

        assert_eq!(first.len() + second.len(), 8);
        for claimed in first.iter().chain(second.iter()) {
            assert_eq!(
                first
                    .iter()
                    .chain(second.iter())
                    .filter(|other| other.id == claimed.id)
                    .count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn exhausted_rows_are_not_claimable() {
        let repository = InMemoryNotificationRepository::new();
        let mut delivery = delivery_for(UserId::new(), UserId::new());
        delivery.attempts = MAX_DELIVERY_ATTEMPTS;
        repository
            .append_fan_out(Vec::new(), vec![delivery])
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        let claimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn stale_claims_become_claimable_again() {
        let repository = InMemoryNotificationRepository::new();
        let delivery = delivery_for(UserId::new(), UserId::new());
        let delivery_id = delivery.id;
        repository
            .append_fan_out(Vec::new(), vec![delivery])
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        // Claimed, then the worker dies before finalizing.
        let claimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert_eq!(claimed.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Within the visibility window the claim holds.
        let held = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert!(held.is_empty());

        // Past it, the row goes back out with another attempt counted.
        let reclaimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, Duration::from_millis(1))
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, delivery_id);
        assert_eq!(reclaimed[0].status, DeliveryStatus::Processing);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    async fn expired_claim_with_no_attempts_left_is_failed() {
        let repository = InMemoryNotificationRepository::new();
        let mut delivery = delivery_for(UserId::new(), UserId::new());
        delivery.attempts = MAX_DELIVERY_ATTEMPTS - 1;
        let delivery_id = delivery.id;
        repository
            .append_fan_out(Vec::new(), vec![delivery])
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        let claimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert_eq!(claimed[0].attempts, MAX_DELIVERY_ATTEMPTS);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let reclaimed = repository
            .claim_delivery_batch(10, MAX_DELIVERY_ATTEMPTS, Duration::from_millis(1))
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        assert!(reclaimed.is_empty());

        let stored = repository
            .find_delivery(delivery_id)
            .await
            .unwrap_or_else(|_| panic!("find failed"))
            .unwrap_or_else(|| panic!("delivery missing"));
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(
            stored.last_error.as_deref(),
            Some("claim expired with no attempts left")
        );
    }

    #[tokio::test]
    async fn terminal_transitions_require_a_processing_row() {
        let repository = InMemoryNotificationRepository::new();
        let delivery = delivery_for(UserId::new(), UserId::new());
        let delivery_id = delivery.id;
        repository
            .append_fan_out(Vec::new(), vec![delivery])
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        // Pending row cannot be marked sent directly.
        let result = repository.mark_delivery_sent(delivery_id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        repository
            .claim_delivery_batch(1, MAX_DELIVERY_ATTEMPTS, VISIBILITY)
            .await
            .unwrap_or_else(|_| panic!("claim failed"));
        repository
            .mark_delivery_failed(delivery_id, "sink unreachable")
            .await
            .unwrap_or_else(|_| panic!("fail transition failed"));

        let stored = repository
            .find_delivery(delivery_id)
            .await
            .unwrap_or_else(|_| panic!("find failed"))
            .unwrap_or_else(|| panic!("delivery missing"));
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("sink unreachable"));
    }

    #[tokio::test]
    async fn mark_read_requires_the_recipient() {
        let repository = InMemoryNotificationRepository::new();
        let recipient = UserId::new();
        let notification = Notification::new(
            recipient,
            UserId::new(),
            NotificationKind::AccessGranted,
            "Access granted",
            "Ada granted you access",
            serde_json::Value::Null,
        );
        let notification_id = notification.id;
        repository
            .append_fan_out(vec![notification], Vec::new())
            .await
            .unwrap_or_else(|_| panic!("append failed"));

        let result = repository
            .mark_notification_read(UserId::new(), notification_id)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        repository
            .mark_notification_read(recipient, notification_id)
            .await
            .unwrap_or_else(|_| panic!("mark read failed"));
        let rows = repository
            .list_for_user(recipient)
            .await
            .unwrap_or_else(|_| panic!("list failed"));
        assert!(rows[0].is_read);
    }
}
