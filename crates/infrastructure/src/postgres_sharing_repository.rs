//! Postgres adapter for the sharing repository port.
//!
//! Multi-row invariants are enforced inside transactions: the request
//! insert gates on open requests before and on active permissions after
//! the insert (with the partial unique index as backstop), and accept
//! locks the request row, flips its status and upserts the permission
//! before committing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vitalshare_application::{AcceptOutcome, SharingRepository};
use vitalshare_core::{AppError, AppResult};
use vitalshare_domain::{
    AccessRequest, PermissionId, PermissionStatus, ReadingPermission, RequestId, RequestStatus,
    UserId,
};


/// Postgres implementation of the sharing repository port.
#[derive(Clone)]
pub struct PostgresSharingRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct AccessRequestRow {
    id: Uuid,
    requester_id: Uuid,
    owner_id: Uuid,
    status: String,
    message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn access_request_from_row(row: AccessRequestRow) -> AppResult<AccessRequest> {
    Ok(AccessRequest {
        id: RequestId::from_uuid(row.id),
        requester_id: UserId::from_uuid(row.requester_id),
        owner_id: UserId::from_uuid(row.owner_id),
        status: RequestStatus::parse(row.status.as_str())?,
        message: row.message,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(sqlx::FromRow)]
struct ReadingPermissionRow {
    id: Uuid,
    viewer_id: Uuid,
    owner_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn reading_permission_from_row(row: ReadingPermissionRow) -> AppResult<ReadingPermission> {
    Ok(ReadingPermission {
        id: PermissionId::from_uuid(row.id),
        viewer_id: UserId::from_uuid(row.viewer_id),
        owner_id: UserId::from_uuid(row.owner_id),
        status: PermissionStatus::parse(row.status.as_str())?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl PostgresSharingRepository {
    /// Creates a repository over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Locks one request row for the duration of a transaction and checks
    /// the actor and state gates.
    async fn lock_pending_request(
        transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AccessRequestRow> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, requester_id, owner_id, status, message, created_at, updated_at
            FROM access_requests
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(request_id.as_uuid())
        .fetch_optional(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load access request '{request_id}': {error}"
            ))
        })?
        .ok_or_else(|| AppError::NotFound(format!("access request '{request_id}'")))?;

        if row.owner_id != acting_owner_id.as_uuid() {
            return Err(AppError::Forbidden(
                "only the owner may act on this request".to_owned(),
            ));
        }
        if row.status != RequestStatus::Pending.as_str() {
            return Err(AppError::Conflict(format!(
                "access request '{request_id}' is not pending"
            )));
        }

        Ok(row)
    }
}

#[async_trait]
impl SharingRepository for PostgresSharingRepository {
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start request insert transaction: {error}"))
        })?;

        let has_open_request = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM access_requests
                WHERE requester_id = $1 AND owner_id = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(request.requester_id.as_uuid())
        .bind(request.owner_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to check for duplicate request: {error}"))
        })?;

        if has_open_request {
            return Err(AppError::Conflict(
                "an access request or permission already exists for this pair".to_owned(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO access_requests (
                id, requester_id, owner_id, status, message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.requester_id.as_uuid())
        .bind(request.owner_id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.message.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            // The partial unique index backstops a racing insert.
            if error
                .as_database_error()
                .is_some_and(|db_error| db_error.is_unique_violation())
            {
                AppError::Conflict(
                    "an access request or permission already exists for this pair".to_owned(),
                )
            } else {
                AppError::Internal(format!(
                    "failed to insert access request '{}': {error}",
                    request.id
                ))
            }
        })?;

        // Re-checked after the insert. A racing accept either committed its
        // permission by now, or its request was still pending and the gate
        // above (or the pending-pair index) already fired.
        let has_permission = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reading_permissions
                WHERE viewer_id = $1 AND owner_id = $2 AND status = 'active'
            )
            "#,
        )
        .bind(request.requester_id.as_uuid())
        .bind(request.owner_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to check for existing permission: {error}"))
        })?;

        if has_permission {
            return Err(AppError::Conflict(
                "an access request or permission already exists for this pair".to_owned(),
            ));
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit request insert transaction: {error}"
            ))
        })
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<AccessRequest>> {
        sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, requester_id, owner_id, status, message, created_at, updated_at
            FROM access_requests
            WHERE id = $1
            "#,
        )
        .bind(request_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load access request '{request_id}': {error}"
            ))
        })?
        .map(access_request_from_row)
        .transpose()
    }

    async fn accept_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AcceptOutcome> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start accept transaction: {error}"))
        })?;

        let locked =
            Self::lock_pending_request(&mut transaction, request_id, acting_owner_id).await?;

        let accepted = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            UPDATE access_requests
            SET status = 'accepted', updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, requester_id, owner_id, status, message, created_at, updated_at
            "#,
        )
        .bind(request_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to accept access request '{request_id}': {error}"
            ))
        })?;

        // Idempotent upsert: replaying acceptance never duplicates the pair.
        let permission = sqlx::query_as::<_, ReadingPermissionRow>(
            r#"
            INSERT INTO reading_permissions (
                id, viewer_id, owner_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'active', now(), now())
            ON CONFLICT (viewer_id, owner_id)
            DO UPDATE SET status = 'active', updated_at = now()
            RETURNING id, viewer_id, owner_id, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(locked.requester_id)
        .bind(locked.owner_id)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to upsert reading permission for request '{request_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit accept transaction: {error}"))
        })?;

        Ok(AcceptOutcome {
            request: access_request_from_row(accepted)?,
            permission: reading_permission_from_row(permission)?,
        })
    }

    async fn decline_request(
        &self,
        request_id: RequestId,
        acting_owner_id: UserId,
    ) -> AppResult<AccessRequest> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start decline transaction: {error}"))
        })?;

        Self::lock_pending_request(&mut transaction, request_id, acting_owner_id).await?;

        let declined = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            UPDATE access_requests
            SET status = 'declined', updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, requester_id, owner_id, status, message, created_at, updated_at
            "#,
        )
        .bind(request_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to decline access request '{request_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit decline transaction: {error}"))
        })?;

        access_request_from_row(declined)
    }

    async fn revoke_access(&self, owner_id: UserId, viewer_id: UserId) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start revoke transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            DELETE FROM reading_permissions
            WHERE viewer_id = $1 AND owner_id = $2
            "#,
        )
        .bind(viewer_id.as_uuid())
        .bind(owner_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete reading permission for viewer '{viewer_id}': {error}"
            ))
        })?;

        sqlx::query(
            r#"
            DELETE FROM access_requests
            WHERE requester_id = $1 AND owner_id = $2
            "#,
        )
        .bind(viewer_id.as_uuid())
        .bind(owner_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete access requests for viewer '{viewer_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit revoke transaction: {error}"))
        })
    }

    async fn has_active_permission(&self, viewer_id: UserId, owner_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reading_permissions
                WHERE viewer_id = $1 AND owner_id = $2 AND status = 'active'
            )
            "#,
        )
        .bind(viewer_id.as_uuid())
        .bind(owner_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to check reading permission: {error}"))
        })
    }

    async fn list_active_viewer_ids(&self, owner_id: UserId) -> AppResult<Vec<UserId>> {
        let viewer_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT viewer_id
            FROM reading_permissions
            WHERE owner_id = $1 AND status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list viewers for owner '{owner_id}': {error}"
            ))
        })?;

        Ok(viewer_ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn list_permissions_for_viewer(
        &self,
        viewer_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        sqlx::query_as::<_, ReadingPermissionRow>(
            r#"
            SELECT id, viewer_id, owner_id, status, created_at, updated_at
            FROM reading_permissions
            WHERE viewer_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(viewer_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list permissions for viewer '{viewer_id}': {error}"
            ))
        })?
        .into_iter()
        .map(reading_permission_from_row)
        .collect()
    }

    async fn list_permissions_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<ReadingPermission>> {
        sqlx::query_as::<_, ReadingPermissionRow>(
            r#"
            SELECT id, viewer_id, owner_id, status, created_at, updated_at
            FROM reading_permissions
            WHERE owner_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list permissions for owner '{owner_id}': {error}"
            ))
        })?
        .into_iter()
        .map(reading_permission_from_row)
        .collect()
    }

    async fn list_pending_requests_for_owner(
        &self,
        owner_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, requester_id, owner_id, status, message, created_at, updated_at
            FROM access_requests
            WHERE owner_id = $1 AND status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list pending requests for owner '{owner_id}': {error}"
            ))
        })?
        .into_iter()
        .map(access_request_from_row)
        .collect()
    }

    async fn list_requests_for_requester(
        &self,
        requester_id: UserId,
    ) -> AppResult<Vec<AccessRequest>> {
        sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, requester_id, owner_id, status, message, created_at, updated_at
            FROM access_requests
            WHERE requester_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(requester_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list requests for requester '{requester_id}': {error}"
            ))
        })?
        .into_iter()
        .map(access_request_from_row)
        .collect()
    }
}
