//! Identity lookup port. User accounts live in an external system.

use async_trait::async_trait;
use vitalshare_core::AppResult;
use vitalshare_domain::{EmailAddress, UserId, UserProfile};

/// Read-only directory of user identities.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves a human-entered email address to a user id.
    async fn find_user_id_by_email(&self, email: &EmailAddress) -> AppResult<Option<UserId>>;

    /// Returns profile data for message construction.
    async fn find_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>>;
}
