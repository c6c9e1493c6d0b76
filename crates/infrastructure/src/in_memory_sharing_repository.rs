//! In-memory sharing repository for tests and local development.
//!
//! Keeps the same atomicity contract as the Postgres adapter by holding a
//! single lock across every multi-row step.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use vitalshare_application::{AcceptOutcome, SharingRepository};
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    AccessRequest, PermissionStatus, ReadingPermission, RequestId, RequestStatus, UserId,
};

#[derive(Default)]
struct SharingState {
    requests: Vec<AccessRequest>,
    permissions: Vec<ReadingPermission>,
}

/// In-memory implementation of the sharing repository port.
#[derive(Default)]
pub struct InMemorySharingRepository {
    state: Mutex<SharingState>,
}

impl InMemorySharingRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharingRepository for InMemorySharingRepository {
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

        // Idempotent upsert on the (viewer, owner) pair.
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
                let permission = ReadingPermission::new(accepted.requester_id, accepted.owner_id)?;
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
        state
            .requests
            .retain(|request| !(request.requester_id == viewer_id && request.owner_id == owner_id));
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
