//! Postgres adapter for notification storage and the delivery queue.
//!
//! Fan-out rows commit in one transaction. Claiming uses a locked CTE with
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the same
//! row, every post-claim transition is guarded on the `processing` state,
//! and claims older than the visibility timeout become claimable again so
//! a crashed worker cannot strand rows.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::types::PgInterval;
use uuid::Uuid;
use vitalshare_application::NotificationRepository;
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    DeliveryId, DeliveryStatus, Notification, NotificationId, NotificationKind, QueuedDelivery,
    UserId,
};


/// Postgres implementation of the notification repository port.
#[derive(Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    subject_id: Uuid,
    kind: String,
    title: String,
    body: String,
    data: serde_json::Value,
    is_read: bool,
    created_at: DateTime<Utc>,
}

fn notification_from_row(row: NotificationRow) -> AppResult<Notification> {
    Ok(Notification {
        id: NotificationId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        subject_id: UserId::from_uuid(row.subject_id),
        kind: NotificationKind::parse(row.kind.as_str())?,
        title: row.title,
        body: row.body,
        data: row.data,
        is_read: row.is_read,
        created_at: row.created_at,
    })
}

#[derive(sqlx::FromRow)]
struct QueuedDeliveryRow {
    id: Uuid,
    recipient_user_id: Uuid,
    kind: String,
    title: String,
    body: String,
    data: serde_json::Value,
    tag: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

fn queued_delivery_from_row(row: QueuedDeliveryRow) -> AppResult<QueuedDelivery> {
    let attempts = u32::try_from(row.attempts).map_err(|_| {
        AppError::Internal(format!(
            "delivery '{}' has negative attempt count {}",
            row.id, row.attempts
        ))
    })?;
    Ok(QueuedDelivery {
        id: DeliveryId::from_uuid(row.id),
        recipient_user_id: UserId::from_uuid(row.recipient_user_id),
        kind: NotificationKind::parse(row.kind.as_str())?,
        title: row.title,
        body: row.body,
        data: row.data,
        tag: row.tag,
        status: DeliveryStatus::parse(row.status.as_str())?,
        attempts,
        last_error: row.last_error,
        created_at: row.created_at,
        processed_at: row.processed_at,
    })
}

impl PostgresNotificationRepository {
    /// Creates a repository over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn append_fan_out(
        &self,
        notifications: Vec<Notification>,
        deliveries: Vec<QueuedDelivery>,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start fan-out transaction: {error}"))
        })?;

        for notification in &notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (
                    id, user_id, subject_id, kind, title, body, data, is_read, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(notification.id.as_uuid())
            .bind(notification.user_id.as_uuid())
            .bind(notification.subject_id.as_uuid())
            .bind(notification.kind.as_str())
            .bind(notification.title.as_str())
            .bind(notification.body.as_str())
            .bind(&notification.data)
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to insert notification '{}': {error}",
                    notification.id
                ))
            })?;
        }

        for delivery in &deliveries {
            sqlx::query(
                r#"
                INSERT INTO queued_deliveries (
                    id, recipient_user_id, kind, title, body, data, tag,
                    status, attempts, last_error, created_at, processed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(delivery.id.as_uuid())
            .bind(delivery.recipient_user_id.as_uuid())
            .bind(delivery.kind.as_str())
            .bind(delivery.title.as_str())
            .bind(delivery.body.as_str())
            .bind(&delivery.data)
            .bind(delivery.tag.as_str())
            .bind(delivery.status.as_str())
            .bind(i32::try_from(delivery.attempts).unwrap_or(i32::MAX))
            .bind(delivery.last_error.as_deref())
            .bind(delivery.created_at)
            .bind(delivery.processed_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to insert queued delivery '{}': {error}",
                    delivery.id
                ))
            })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit fan-out transaction: {error}"))
        })
    }

    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, subject_id, kind, title, body, data, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list notifications for user '{user_id}': {error}"
            ))
        })?
        .into_iter()
        .map(notification_from_row)
        .collect()
    }

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark notification '{notification_id}' read: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "notification '{notification_id}'"
            )));
        }
        Ok(())
    }

    async fn claim_delivery_batch(
        &self,
        limit: usize,
        max_attempts: u32,
        visibility_timeout: Duration,
    ) -> AppResult<Vec<QueuedDelivery>> {
        let visibility = PgInterval {
            months: 0,
            days: 0,
            microseconds: i64::try_from(visibility_timeout.as_micros()).unwrap_or(i64::MAX),
        };

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start claim transaction: {error}"))
        })?;

        // Expired claims past the attempt budget would otherwise sit in
        // processing forever; finalize them instead of re-issuing.
        sqlx::query(
            r#"
            UPDATE queued_deliveries
            SET status = 'failed', last_error = 'claim expired with no attempts left'
            WHERE status = 'processing'
              AND processed_at < now() - $1
              AND attempts >= $2
            "#,
        )
        .bind(&visibility)
        .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to expire exhausted claims: {error}"))
        })?;

        let rows = sqlx::query_as::<_, QueuedDeliveryRow>(
            r#"
            WITH candidate AS (
                SELECT id
                FROM queued_deliveries
                WHERE (status = 'pending'
                       OR (status = 'processing' AND processed_at < now() - $3))
                  AND attempts < $2
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queued_deliveries
            SET status = 'processing', attempts = attempts + 1, processed_at = now()
            FROM candidate
            WHERE queued_deliveries.id = candidate.id
            RETURNING queued_deliveries.id, recipient_user_id, kind, title, body, data,
                      tag, status, attempts, last_error, created_at, processed_at
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
        .bind(&visibility)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to claim delivery batch: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit claim transaction: {error}"))
        })?;

        rows.into_iter().map(queued_delivery_from_row).collect()
    }

    async fn mark_delivery_sent(&self, delivery_id: DeliveryId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE queued_deliveries
            SET status = 'sent', processed_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(delivery_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark delivery '{delivery_id}' sent: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "delivery '{delivery_id}' is not processing"
            )));
        }
        Ok(())
    }

    async fn release_delivery_for_retry(&self, delivery_id: DeliveryId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE queued_deliveries
            SET status = 'pending'
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(delivery_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to release delivery '{delivery_id}' for retry: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "delivery '{delivery_id}' is not processing"
            )));
        }
        Ok(())
    }

    async fn mark_delivery_failed(
        &self,
        delivery_id: DeliveryId,
        error_message: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE queued_deliveries
            SET status = 'failed', last_error = $2, processed_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(delivery_id.as_uuid())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark delivery '{delivery_id}' failed: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "delivery '{delivery_id}' is not processing"
            )));
        }
        Ok(())
    }

    async fn find_delivery(&self, delivery_id: DeliveryId) -> AppResult<Option<QueuedDelivery>> {
        sqlx::query_as::<_, QueuedDeliveryRow>(
            r#"
            SELECT id, recipient_user_id, kind, title, body, data, tag,
                   status, attempts, last_error, created_at, processed_at
            FROM queued_deliveries
            WHERE id = $1
            "#,
        )
        .bind(delivery_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load delivery '{delivery_id}': {error}"))
        })?
        .map(queued_delivery_from_row)
        .transpose()
    }
}
