//! Sharing lifecycle handlers: request, accept, decline, revoke, listings.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vitalshare_domain::{AccessRequest, EmailAddress, ReadingPermission, RequestId, UserId};

use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;


#[derive(Debug, Deserialize)]
pub struct CreateAccessRequestRequest {
    pub owner_email: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessRequestResponse {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessRequest> for AccessRequestResponse {
    fn from(request: AccessRequest) -> Self {
        Self {
            id: request.id.as_uuid(),
            requester_id: request.requester_id.as_uuid(),
            owner_id: request.owner_id.as_uuid(),
            status: request.status.as_str().to_owned(),
            message: request.message,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingPermissionResponse {
    pub id: Uuid,
    pub viewer_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReadingPermission> for ReadingPermissionResponse {
    fn from(permission: ReadingPermission) -> Self {
        Self {
            id: permission.id.as_uuid(),
            viewer_id: permission.viewer_id.as_uuid(),
            owner_id: permission.owner_id.as_uuid(),
            status: permission.status.as_str().to_owned(),
            created_at: permission.created_at,
            updated_at: permission.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AcceptRequestResponse {
    pub request: AccessRequestResponse,
    pub permission: ReadingPermissionResponse,
}

pub async fn create_request_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateAccessRequestRequest>,
) -> ApiResult<(StatusCode, Json<AccessRequestResponse>)> {
    let owner_email = EmailAddress::new(payload.owner_email)?;
    let request = state
        .sharing_service
        .request_access_by_email(user_id, &owner_email, payload.message)
        .await?;

    Ok((StatusCode::CREATED, Json(request.into())))
}

pub async fn accept_request_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<AcceptRequestResponse>> {
    let outcome = state
        .sharing_service
        .accept_request(RequestId::from_uuid(request_id), user_id)
        .await?;

    Ok(Json(AcceptRequestResponse {
        request: outcome.request.into(),
        permission: outcome.permission.into(),
    }))
}

pub async fn decline_request_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .sharing_service
        .decline_request(RequestId::from_uuid(request_id), user_id)
        .await?;

    Ok(Json(request.into()))
}

pub async fn revoke_access_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(viewer_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .sharing_service
        .revoke_access(user_id, UserId::from_uuid(viewer_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_pending_requests_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<AccessRequestResponse>>> {
    let requests = state
        .sharing_service
        .pending_requests_for_owner(user_id)
        .await?
        .into_iter()
        .map(AccessRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn list_sent_requests_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<AccessRequestResponse>>> {
    let requests = state
        .sharing_service
        .requests_for_requester(user_id)
        .await?
        .into_iter()
        .map(AccessRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn list_granted_permissions_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<ReadingPermissionResponse>>> {
    let permissions = state
        .sharing_service
        .permissions_for_owner(user_id)
        .await?
        .into_iter()
        .map(ReadingPermissionResponse::from)
        .collect();

    Ok(Json(permissions))
}

pub async fn list_received_permissions_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<ReadingPermissionResponse>>> {
    let permissions = state
        .sharing_service
        .permissions_for_viewer(user_id)
        .await?
        .into_iter()
        .map(ReadingPermissionResponse::from)
        .collect();

    Ok(Json(permissions))
}
