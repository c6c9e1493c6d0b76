//! Realtime sync client.
//!
//! A consumer, not a data owner: it listens to the change stream scoped to
//! one user and refetches whole collections on every event. A lagged stream
//! reconciles with a full refetch; the stream itself offers no catch-up.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use vitalshare_core::AppResult;
use vitalshare_domain::{AccessRequest, Notification, ReadingPermission, UserId};

use crate::notification_ports::NotificationRepository;
use crate::realtime_ports::{ChangeEvent, ChangeSubscriber, ChangeTopic};
use crate::sharing_ports::SharingRepository;


/// Locally cached view of everything the stream can invalidate.
#[derive(Debug, Clone, Default)]
pub struct SharedStateSnapshot {
    /// Permissions other owners granted to this user.
    pub permissions_granted_to_me: Vec<ReadingPermission>,
    /// Permissions this user granted to viewers.
    pub permissions_i_granted: Vec<ReadingPermission>,
    /// Pending requests awaiting this user's decision.
    pub pending_requests: Vec<AccessRequest>,
    /// Requests this user has sent, any state.
    pub sent_requests: Vec<AccessRequest>,
    /// This user's notifications, newest first.
    pub notifications: Vec<Notification>,
}

/// Change-stream consumer keeping one user's collections fresh.
pub struct SyncClient {
    user_id: UserId,
    subscriber: Arc<dyn ChangeSubscriber>,
    sharing_repository: Arc<dyn SharingRepository>,
    notification_repository: Arc<dyn NotificationRepository>,
    snapshot: RwLock<SharedStateSnapshot>,
}

impl SyncClient {
    /// Creates a sync client for one user.
    #[must_use]
    pub fn new(
        user_id: UserId,
        subscriber: Arc<dyn ChangeSubscriber>,
        sharing_repository: Arc<dyn SharingRepository>,
        notification_repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            user_id,
            subscriber,
            sharing_repository,
            notification_repository,
            snapshot: RwLock::new(SharedStateSnapshot::default()),
        }
    }

    /// Returns a copy of the current snapshot.
    pub async fn snapshot(&self) -> SharedStateSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Refetches every collection. Used on startup and whenever events may
    /// have been missed.
    pub async fn refresh_all(&self) -> AppResult<()> {
        let permissions_granted_to_me = self
            .sharing_repository
            .list_permissions_for_viewer(self.user_id)
            .await?;
        let permissions_i_granted = self
            .sharing_repository
            .list_permissions_for_owner(self.user_id)
            .await?;
        let pending_requests = self
            .sharing_repository
            .list_pending_requests_for_owner(self.user_id)
            .await?;
        let sent_requests = self
            .sharing_repository
            .list_requests_for_requester(self.user_id)
            .await?;
        let notifications = self
            .notification_repository
            .list_for_user(self.user_id)
            .await?;

        let mut snapshot = self.snapshot.write().await;
        *snapshot = SharedStateSnapshot {
            permissions_granted_to_me,
            permissions_i_granted,
            pending_requests,
            sent_requests,
            notifications,
        };

        Ok(())
    }

    /// Applies one change event: events for other users are ignored, events
    /// for this user refetch the affected collection whole rather than
    /// patching incrementally.
    pub async fn apply(&self, event: ChangeEvent) -> AppResult<()> {
        if event.user_id != self.user_id {
            return Ok(());
        }

        match event.topic {
            ChangeTopic::Permissions => {
                let granted_to_me = self
                    .sharing_repository
                    .list_permissions_for_viewer(self.user_id)
                    .await?;
                let i_granted = self
                    .sharing_repository
                    .list_permissions_for_owner(self.user_id)
                    .await?;
                let mut snapshot = self.snapshot.write().await;
                snapshot.permissions_granted_to_me = granted_to_me;
                snapshot.permissions_i_granted = i_granted;
            }
            ChangeTopic::Requests => {
                let pending = self
                    .sharing_repository
                    .list_pending_requests_for_owner(self.user_id)
                    .await?;
                let sent = self
                    .sharing_repository
                    .list_requests_for_requester(self.user_id)
                    .await?;
                let mut snapshot = self.snapshot.write().await;
                snapshot.pending_requests = pending;
                snapshot.sent_requests = sent;
            }
            ChangeTopic::Notifications => {
                let notifications = self
                    .notification_repository
                    .list_for_user(self.user_id)
                    .await?;
                let mut snapshot = self.snapshot.write().await;
                snapshot.notifications = notifications;
            }
        }

        Ok(())
    }

    /// Subscribes and processes events until the stream closes.
    ///
    /// Performs a full refetch on subscribe, so a caller reconnecting after
    /// connection loss reconciles missed events by invoking `run` again.
    pub async fn run(&self) -> AppResult<()> {
        let mut receiver = self.subscriber.subscribe();
        self.refresh_all().await?;

        loop {
            match receiver.recv().await {
                Ok(event) => self.apply(event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(user_id = %self.user_id, skipped, "change stream lagged, refetching");
                    self.refresh_all().await?;
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
