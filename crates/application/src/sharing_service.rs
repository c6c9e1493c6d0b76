//! Reading-access state machine service.

use std::sync::Arc;

use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    AccessRequest, EmailAddress, ReadingPermission, RequestId, UserId,
};

use crate::notification_service::NotificationService;
use crate::realtime_ports::{ChangeEvent, ChangePublisher, ChangeTopic};
use crate::sharing_ports::{AcceptOutcome, SharingRepository};
use crate::user_ports::UserDirectory;


/// Service driving the request → accept/decline → permission lifecycle.
#[derive(Clone)]
pub struct SharingService {
    repository: Arc<dyn SharingRepository>,
    notification_service: NotificationService,
    user_directory: Arc<dyn UserDirectory>,
    change_publisher: Arc<dyn ChangePublisher>,
}

impl SharingService {
    /// Creates a sharing service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn SharingRepository>,
        notification_service: NotificationService,
        user_directory: Arc<dyn UserDirectory>,
        change_publisher: Arc<dyn ChangePublisher>,
    ) -> Self {
        Self {
            repository,
            notification_service,
            user_directory,
            change_publisher,
        }
    }

    /// Resolves an owner by email and creates an access request.
    pub async fn request_access_by_email(
        &self,
        requester_id: UserId,
        owner_email: &EmailAddress,
        message: Option<String>,
    ) -> AppResult<AccessRequest> {
        let owner_id = self
            .user_directory
            .find_user_id_by_email(owner_email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no user found for email '{}'",
                    owner_email.as_str()
                ))
            })?;

        self.create_request(requester_id, owner_id, message).await
    }

    /// Creates a pending access request and notifies the owner.
    ///
    /// Self-requests are a validation error; an existing pending request or
    /// active permission for the pair is a conflict.
    pub async fn create_request(
        &self,
        requester_id: UserId,
        owner_id: UserId,
        message: Option<String>,
    ) -> AppResult<AccessRequest> {
        let request = AccessRequest::new(requester_id, owner_id, message)?;
        self.repository.insert_request(&request).await?;

        self.notification_service
            .access_request_created(&request)
            .await?;
        self.publish_request_change(requester_id, owner_id).await?;

        Ok(request)
    }

    /// Accepts a pending request, materializing the reading permission, and
    /// notifies the requester.
    ///
    /// The status transition and the permission upsert are one repository
    /// transaction; a second accept returns a conflict without creating a
    /// duplicate permission.
    pub async fn accept_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AcceptOutcome> {
        let outcome = self
            .repository
            .accept_request(request_id, acting_owner_id)
            .await?;

        self.notification_service
            .access_request_accepted(&outcome.request, &outcome.permission)
            .await?;
        self.publish_request_change(outcome.request.requester_id, outcome.request.owner_id)
            .await?;
        self.publish_permission_change(outcome.permission.viewer_id, outcome.permission.owner_id)
            .await?;

        Ok(outcome)
    }

    /// Declines a pending request. No permission is created and the
    /// requester is not notified.
    pub async fn decline_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AccessRequest> {
        let request = self
            .repository
            .decline_request(request_id, acting_owner_id)
            .await?;

        self.publish_request_change(request.requester_id, request.owner_id)
            .await?;

        Ok(request)
    }

    /// Revokes a viewer's access, deleting the permission and any lingering
    /// request rows so the viewer may ask again later. Idempotent.
    pub async fn revoke_access(&self, owner_id: UserId, viewer_id: UserId) -> AppResult<()> {
        self.repository.revoke_access(owner_id, viewer_id).await?;

        self.publish_request_change(viewer_id, owner_id).await?;
        self.publish_permission_change(viewer_id, owner_id).await
    }

    /// Lists permissions granted to a viewer.
    pub async fn permissions_for_viewer(
        &self,
        viewer_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        self.repository.list_permissions_for_viewer(viewer_id).await
    }

    /// Lists permissions an owner has granted.
    pub async fn permissions_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        self.repository.list_permissions_for_owner(owner_id).await
    }

    /// Lists pending requests awaiting an owner's decision.
    pub async fn pending_requests_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        self.repository
            .list_pending_requests_for_owner(owner_id)
            .await
    }

    /// Lists requests a user has sent.
    pub async fn requests_for_requester(
        &self,
        requester_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        self.repository
            .list_requests_for_requester(requester_id)
            .await
    }

    async fn publish_request_change(
        &self,
        requester_id: UserId,
        owner_id: UserId,
    ) -> AppResult<()> {
        self.change_publisher
            .publish(ChangeEvent::new(ChangeTopic::Requests, requester_id))
            .await?;
        self.change_publisher
            .publish(ChangeEvent::new(ChangeTopic::Requests, owner_id))
            .await
    }

    async fn publish_permission_change(
        &self,
        viewer_id: UserId,
        owner_id: UserId,
    ) -> AppResult<()> {
        self.change_publisher
            .publish(ChangeEvent::new(ChangeTopic::Permissions, viewer_id))
            .await?;
        self.change_publisher
            .publish(ChangeEvent::new(ChangeTopic::Permissions, owner_id))
            .await
    }
}
