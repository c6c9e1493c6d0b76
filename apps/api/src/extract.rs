//! Request extractors.
//!
//! Authentication terminates at the edge gateway, which forwards the
//! verified caller identity in the `x-user-id` header. Handlers take it
//! through [`CurrentUser`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;
use vitalshare_core::AppError;
use vitalshare_domain::UserId;

use crate::error::ApiError;

/// Identity header set by the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified caller identity.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError(AppError::Unauthorized(format!(
                    "missing {USER_ID_HEADER} header"
                )))
            })?;

        let user_uuid = Uuid::parse_str(raw).map_err(|error| {
            ApiError(AppError::Unauthorized(format!(
                "invalid {USER_ID_HEADER} header: {error}"
            )))
        })?;

        Ok(Self(UserId::from_uuid(user_uuid)))
    }
}
