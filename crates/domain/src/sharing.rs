//! Reading-access requests and permissions.
//!
//! An `AccessRequest` and a `ReadingPermission` share the (viewer, owner)
//! pair but have independent lifecycles: a permission outlives its
//! originating request, and a terminal request is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vitalshare_core::{AppError, AppResult};

use crate::user::UserId;

/// Unique identifier for an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random request identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a request identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a reading permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionId(Uuid);

impl PermissionId {
    /// Creates a new random permission identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a permission identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PermissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting a decision by the owner.
    Pending,
    /// Owner granted access; terminal.
    Accepted,
    /// Owner declined access; terminal.
    Declined,
}

impl RequestStatus {
    /// Returns the storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    /// Parses a storage string into a request status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            _ => Err(AppError::Validation(format!(
                "unknown access request status '{value}'"
            ))),
        }
    }

    /// Returns true when no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Declined)
    }
}

/// Lifecycle state of a reading permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Viewer may read the owner's metrics and receives fan-out.
    Active,
    /// Grant retained but suspended; excluded from fan-out.
    Blocked,
}

impl PermissionStatus {
    /// Returns the storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }

    /// Parses a storage string into a permission status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            _ => Err(AppError::Validation(format!(
                "unknown reading permission status '{value}'"
            ))),
        }
    }
}

/// A viewer's request to read an owner's health metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Identifier of this request.
    pub id: RequestId,
    /// User asking for read access.
    pub requester_id: UserId,
    /// User whose metrics would become readable.
    pub owner_id: UserId,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Optional free-text message from the requester.
    pub message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AccessRequest {
    /// Creates a new pending request.
    ///
    /// Rejects self-requests; the per-pair uniqueness invariant is enforced
    /// by the repository.
    pub fn new(requester_id: UserId, owner_id: UserId, message: Option<String>) -> AppResult<Self> {
        if requester_id == owner_id {
            return Err(AppError::Validation(
                "cannot request access to your own readings".to_owned(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: RequestId::new(),
            requester_id,
            owner_id,
            status: RequestStatus::Pending,
            message: message.filter(|text| !text.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }
}

/// A standing grant allowing a viewer to read an owner's metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPermission {
    /// Identifier of this permission.
    pub id: PermissionId,
    /// User allowed to read.
    pub viewer_id: UserId,
    /// User whose metrics are readable.
    pub owner_id: UserId,
    /// Lifecycle state.
    pub status: PermissionStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ReadingPermission {
    /// Creates a new active permission for a (viewer, owner) pair.
    pub fn new(viewer_id: UserId, owner_id: UserId) -> AppResult<Self> {
        if viewer_id == owner_id {
            return Err(AppError::Validation(
                "a reading permission cannot point at its own owner".to_owned(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: PermissionId::new(),
            viewer_id,
            owner_id,
            status: PermissionStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}
