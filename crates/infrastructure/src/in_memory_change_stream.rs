//! In-process change stream for single-node deployments and tests.

use async_trait::async_trait;
use tokio::sync::broadcast;
use vitalshare_application::{ChangeEvent, ChangePublisher, ChangeSubscriber};
use vitalshare_core::AppResult;

/// Broadcast-channel change stream; publisher and subscriber share one
/// in-process channel.
pub struct InMemoryChangeStream {
    sender: broadcast::Sender<ChangeEvent>,
}

impl InMemoryChangeStream {
    /// Creates a change stream buffering up to `capacity` events per
    /// subscriber before lag kicks in.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for InMemoryChangeStream {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ChangePublisher for InMemoryChangeStream {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        // No subscribers means no one to notify; not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

impl ChangeSubscriber for InMemoryChangeStream {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use vitalshare_application::ChangeTopic;
    use vitalshare_domain::UserId;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_published_after_subscribing() {
        let stream = InMemoryChangeStream::new(8);
        let mut receiver = stream.subscribe();

        let event = ChangeEvent::new(ChangeTopic::Notifications, UserId::new());
        stream
            .publish(event)
            .await
            .unwrap_or_else(|_| panic!("publish failed"));

        let received = receiver
            .recv()
            .await
            .unwrap_or_else(|_| panic!("recv failed"));
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let stream = InMemoryChangeStream::new(8);
        let result = stream
            .publish(ChangeEvent::new(ChangeTopic::Permissions, UserId::new()))
            .await;
        assert!(result.is_ok());
    }
}
