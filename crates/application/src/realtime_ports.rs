//! Change-stream ports for realtime client sync.
//!
//! Services publish one event per affected user after a committed write.
//! The stream is best-effort with at-least-once delivery to connected
//! subscribers and no catch-up: consumers reconcile with a full refetch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vitalshare_core::AppResult;
use vitalshare_domain::UserId;

/// Collection a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTopic {
    /// Reading permissions where the user is viewer or owner.
    Permissions,
    /// Access requests where the user is requester or owner.
    Requests,
    /// The user's notification list.
    Notifications,
}

/// One change event scoped to a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Affected collection.
    pub topic: ChangeTopic,
    /// User whose view of that collection changed.
    pub user_id: UserId,
}

impl ChangeEvent {
    /// Creates a change event.
    #[must_use]
    pub fn new(topic: ChangeTopic, user_id: UserId) -> Self {
        Self { topic, user_id }
    }
}

/// Publishing side of the change stream.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    /// Publishes one event to current subscribers. Best-effort: an event
    /// with no subscribers is dropped, not an error.
    async fn publish(&self, event: ChangeEvent) -> AppResult<()>;
}

/// Subscribing side of the change stream.
pub trait ChangeSubscriber: Send + Sync {
    /// Opens a new subscription receiving events published from now on.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
