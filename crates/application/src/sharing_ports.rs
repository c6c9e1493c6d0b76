//! Repository port for access requests and reading permissions.

use async_trait::async_trait;
use vitalshare_core::AppResult;
use vitalshare_domain::{AccessRequest, ReadingPermission, RequestId, UserId};

/// Result of accepting a request: the terminal request plus the permission
/// it materialized, produced in one transaction.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    /// The request, now in accepted state.
    pub request: AccessRequest,
    /// The active permission for (requester, owner).
    pub permission: ReadingPermission,
}

/// Repository port for the reading-access state machine.
///
/// Multi-row invariants live behind this port: implementations must make
/// `insert_request`'s duplicate check and `accept_request`'s status
/// transition plus permission upsert atomic.
#[async_trait]
pub trait SharingRepository: Send + Sync {
    /// Inserts a pending request.
    ///
    /// Fails with a conflict when the pair already has a pending request or
    /// an active permission. The check runs atomically with the insert.
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()>;

    /// Returns one request by id.
    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<AccessRequest>>;

    /// Transitions a pending request to accepted and upserts the permission.
    ///
    /// Compare-and-set semantics: fails with not-found for an unknown id,
    /// forbidden when the actor is not the owner, and conflict when the
    /// request is no longer pending. The status update and the permission
    /// upsert commit together; repeating the upsert never duplicates the
    /// (viewer, owner) permission.
    async fn accept_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AcceptOutcome>;

    /// Transitions a pending request to declined. Same guards as accept;
    /// no permission is created.
    async fn decline_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AccessRequest>;

    /// Deletes the permission and any request rows for (viewer, owner).
    /// Idempotent: absent rows are not an error.
    async fn revoke_access(&self, owner_id: UserId, viewer_id: UserId) -> AppResult<()>;

    /// Returns true when an active permission exists for (viewer, owner).
    async fn has_active_permission(&self, viewer_id: UserId, owner_id: UserId) -> AppResult<bool>;

    /// Lists viewer ids holding an active permission on the owner, the
    /// fan-out recipient set for metric events.
    async fn list_active_viewer_ids(&self, owner_id: UserId) -> AppResult<Vec<UserId>>;

    /// Lists permissions granted to a viewer.
    async fn list_permissions_for_viewer(
        &self,
        viewer_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>>;

    /// Lists permissions an owner has granted.
    async fn list_permissions_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>>;

    /// Lists pending requests awaiting an owner's decision.
    async fn list_pending_requests_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<AccessRequest>>;

    /// Lists requests a user has sent, any state.
    async fn list_requests_for_requester(
        &self,
        requester_id: UserId,
    ) -> AppResult<Vec<AccessRequest>>;
}
