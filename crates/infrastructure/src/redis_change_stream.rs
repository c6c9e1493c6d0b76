//! Redis pub/sub change stream for multi-node deployments.
//!
//! Events are published as JSON on one channel. A background task owns the
//! pub/sub connection and forwards decoded events into a local broadcast
//! channel, so subscribers keep the same `broadcast::Receiver` interface as
//! the in-process stream.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::warn;
use vitalshare_application::{ChangeEvent, ChangePublisher, ChangeSubscriber};
use vitalshare_core::{AppError, AppResult};


/// Redis-backed implementation of the change stream ports.
pub struct RedisChangeStream {
    connection: ConnectionManager,
    channel: String,
    sender: broadcast::Sender<ChangeEvent>,
}

impl RedisChangeStream {
    /// Connects both sides and returns a ready stream.
    ///
    /// Publishing goes through one managed connection opened here, which
    /// reconnects on error. A spawned task owns the pub/sub connection and
    /// forwards inbound messages to local subscribers until it drops.
    pub async fn connect(client: redis::Client, channel: impl Into<String>) -> AppResult<Self> {
        let channel = channel.into();
        let (sender, _) = broadcast::channel(256);

        let mut pubsub = client.get_async_pubsub().await.map_err(|error| {
            AppError::Internal(format!("failed to open redis pub/sub connection: {error}"))
        })?;
        pubsub.subscribe(channel.as_str()).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to subscribe to redis channel '{channel}': {error}"
            ))
        })?;

        let forward_sender = sender.clone();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(error = %error, "dropping unreadable change event payload");
                        continue;
                    }
                };
                match serde_json::from_str::<ChangeEvent>(&payload) {
                    Ok(event) => {
                        let _ = forward_sender.send(event);
                    }
                    Err(error) => {
                        warn!(error = %error, payload = %payload, "dropping undecodable change event");
                    }
                }
            }
            warn!("redis change stream subscription ended");
        });

        let connection = client.get_connection_manager().await.map_err(|error| {
            AppError::Internal(format!("failed to open redis connection: {error}"))
        })?;

        Ok(Self {
            connection,
            channel,
            sender,
        })
    }
}

#[async_trait]
impl ChangePublisher for RedisChangeStream {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event).map_err(|error| {
            AppError::Internal(format!("failed to encode change event: {error}"))
        })?;

        let mut connection = self.connection.clone();
        let _: () = connection
            .publish(self.channel.as_str(), payload)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to publish change event: {error}"))
            })?;

        Ok(())
    }
}

impl ChangeSubscriber for RedisChangeStream {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
