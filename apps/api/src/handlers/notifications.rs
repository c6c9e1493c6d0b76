//! In-app notification handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use vitalshare_domain::{Notification, NotificationId};

use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id.as_uuid(),
            subject_id: notification.subject_id.as_uuid(),
            kind: notification.kind.as_str().to_owned(),
            title: notification.title,
            body: notification.body,
            data: notification.data,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

pub async fn list_notifications_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let notifications = state
        .notification_service
        .list_for_user(user_id)
        .await?
        .into_iter()
        .map(NotificationResponse::from)
        .collect();

    Ok(Json(notifications))
}

pub async fn mark_notification_read_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .notification_service
        .mark_read(user_id, NotificationId::from_uuid(notification_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
