//! Shared port fakes for service tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    AccessRequest, DeliveryId, DeliveryStatus, EmailAddress, Notification, NotificationId,
    PermissionStatus, QueuedDelivery, ReadingPermission, RequestId, RequestStatus, UserId,
    UserProfile,
};

use crate::notification_ports::{NotificationRepository, NotificationSink, OutboundNotification};
use crate::realtime_ports::{ChangeEvent, ChangePublisher, ChangeSubscriber};
use crate::sharing_ports::{AcceptOutcome, SharingRepository};
use crate::user_ports::UserDirectory;

#[derive(Default)]
struct SharingState {
    requests: Vec<AccessRequest>,
    permissions: Vec<ReadingPermission>,
}

/// Sharing repository fake with the same atomicity contract as the real
/// adapters: every multi-row step happens under one lock.
#[derive(Default)]
pub(crate) struct MemorySharingRepository {
    state: Mutex<SharingState>,
}

impl MemorySharingRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn permission_count(&self) -> usize {
        self.state.lock().await.permissions.len()
    }

    pub(crate) async fn seed_active_permission(&self, viewer_id: UserId, owner_id: UserId) {
        let permission =
            ReadingPermission::new(viewer_id, owner_id).unwrap_or_else(|_| panic!("test"));
        self.state.lock().await.permissions.push(permission);
    }
}

#[async_trait]
impl SharingRepository for MemorySharingRepository {
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let has_open_request = state.requests.iter().any(|existing| {
            existing.requester_id == request.requester_id
                && existing.owner_id == request.owner_id
                && existing.status == RequestStatus::Pending
        });
        let has_active_permission = state.permissions.iter().any(|permission| {
            permission.viewer_id == request.requester_id
                && permission.owner_id == request.owner_id
                && permission.status == PermissionStatus::Active
        });
        if has_open_request || has_active_permission {
            return Err(AppError::Conflict(
                "an access request or permission already exists for this pair".to_owned(),
            ));
        }

        state.requests.push(request.clone());
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<AccessRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .iter()
            .find(|request| request.id == request_id)
            .cloned())
    }

    async fn accept_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AcceptOutcome> {
        let mut state = self.state.lock().await;

        let request = state
            .requests
            .iter_mut()
            .find(|request| request.id == request_id)
            .ok_or_else(|| AppError::NotFound(format!("access request '{request_id}'")))?;
        if request.owner_id != acting_owner_id {
            return Err(AppError::Forbidden(
                "only the owner may act on this request".to_owned(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "access request '{request_id}' is not pending"
            )));
        }

        request.status = RequestStatus::Accepted;
        request.updated_at = Utc::now();
        let accepted = request.clone();

        let permission = match state.permissions.iter_mut().find(|permission| {
            permission.viewer_id == accepted.requester_id
                && permission.owner_id == accepted.owner_id
        }) {
            Some(existing) => {
                existing.status = PermissionStatus::Active;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let permission =
                    ReadingPermission::new(accepted.requester_id, accepted.owner_id)?;
                state.permissions.push(permission.clone());
                permission
            }
        };

        Ok(AcceptOutcome {
            request: accepted,
            permission,
        })
    }

    async fn decline_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AccessRequest> {
        let mut state = self.state.lock().await;

        let request = state
            .requests
            .iter_mut()
            .find(|request| request.id == request_id)
            .ok_or_else(|| AppError::NotFound(format!("access request '{request_id}'")))?;
        if request.owner_id != acting_owner_id {
            return Err(AppError::Forbidden(
                "only the owner may act on this request".to_owned(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "access request '{request_id}' is not pending"
            )));
        }

        request.status = RequestStatus::Declined;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn revoke_access(&self, owner_id: UserId, viewer_id: UserId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.permissions.retain(|permission| {
            !(permission.viewer_id == viewer_id && permission.owner_id == owner_id)
        });
        state.requests.retain(|request| {
            !(request.requester_id == viewer_id && request.owner_id == owner_id)
        });
        Ok(())
    }

    async fn has_active_permission(&self, viewer_id: UserId, owner_id: UserId) -> AppResult<bool> {
        Ok(self.state.lock().await.permissions.iter().any(|permission| {
            permission.viewer_id == viewer_id
                && permission.owner_id == owner_id
                && permission.status == PermissionStatus::Active
        }))
    }

    async fn list_active_viewer_ids(&self, owner_id: UserId) -> AppResult<Vec<UserId>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .filter(|permission| {
                permission.owner_id == owner_id && permission.status == PermissionStatus::Active
            })
            .map(|permission| permission.viewer_id)
            .collect())
    }

    async fn list_permissions_for_viewer(
        &self,
        viewer_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .filter(|permission| permission.viewer_id == viewer_id)
            .cloned()
            .collect())
    }

    async fn list_permissions_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .filter(|permission| permission.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_pending_requests_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| {
                request.owner_id == owner_id && request.status == RequestStatus::Pending
            })
            .cloned()
            .collect())
    }

    async fn list_requests_for_requester(
        &self,
        requester_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| request.requester_id == requester_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct NotificationState {
    notifications: Vec<Notification>,
    deliveries: Vec<QueuedDelivery>,
}

/// Notification repository fake mirroring the claim state machine.
#[derive(Default)]
pub(crate) struct MemoryNotificationRepository {
    state: Mutex<NotificationState>,
}

impl MemoryNotificationRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub(crate) async fn deliveries(&self) -> Vec<QueuedDelivery> {
        self.state.lock().await.deliveries.clone()
    }

    pub(crate) async fn push_delivery(&self, delivery: QueuedDelivery) {
        self.state.lock().await.deliveries.push(delivery);
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
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
            .find(|notification| notification.id == notification_id && notification.user_id == user_id)
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

impl MemoryNotificationRepository {
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
                "delivery '{delivery_id}' is not being processed"
            )));
        }
        delivery.status = status;
        if let Some(message) = error_message {
            delivery.last_error = Some(message.to_owned());
        }
        Ok(())
    }
}

/// Fixed user directory.
#[derive(Default)]
pub(crate) struct MemoryDirectory {
    profiles: HashMap<UserId, UserProfile>,
}

impl MemoryDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_user(mut self, email: &str, full_name: Option<&str>) -> (Self, UserId) {
        let id = UserId::new();
        let profile = UserProfile {
            id,
            email: EmailAddress::new(email).unwrap_or_else(|_| panic!("test")),
            full_name: full_name.map(ToOwned::to_owned),
        };
        self.profiles.insert(id, profile);
        (self, id)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_user_id_by_email(&self, email: &EmailAddress) -> AppResult<Option<UserId>> {
        Ok(self
            .profiles
            .values()
            .find(|profile| profile.email == *email)
            .map(|profile| profile.id))
    }

    async fn find_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>> {
        Ok(self.profiles.get(&user_id).cloned())
    }
}

/// In-process change stream backed by a broadcast channel.
pub(crate) struct BroadcastChangeStream {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastChangeStream {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }
}

impl BroadcastChangeStream {
    /// Subscriber handle that does not keep the channel open, so dropping
    /// the stream ends downstream `run` loops.
    pub(crate) fn detached_subscriber(&self) -> DetachedSubscriber {
        DetachedSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver-only view of a broadcast change stream.
pub(crate) struct DetachedSubscriber {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl ChangeSubscriber for DetachedSubscriber {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.receiver.resubscribe()
    }
}

#[async_trait]
impl ChangePublisher for BroadcastChangeStream {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        let _ = self.sender.send(event);
        Ok(())
    }
}

impl ChangeSubscriber for BroadcastChangeStream {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

/// Sink that records every send and fails the first `fail_first` calls.
pub(crate) struct RecordingSink {
    pub(crate) sent: Mutex<Vec<(UserId, OutboundNotification)>>,
    fail_first: AtomicUsize,
}

impl RecordingSink {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing_first(count: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(count),
        })
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, recipient: UserId, outbound: &OutboundNotification) -> AppResult<()> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Internal("sink unreachable".to_owned()));
        }

        self.sent.lock().await.push((recipient, outbound.clone()));
        Ok(())
    }
}
